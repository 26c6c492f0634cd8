use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command};

use crate::{collecter::settings::Settings as CollecterSettings, device::ReceiverModel};

use std::str::FromStr;

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

impl Cli {
    /// Build new command line interface
    pub fn new() -> Self {
        Self {
            matches: {
                Command::new("ash2rinex")
                    .author("Guillaume W. Bres, <guillaume.bressaix@gmail.com>")
                    .version(env!("CARGO_PKG_VERSION"))
                    .about("Ashtech Z-12 binary stream collecter")
                    .color(ColorChoice::Always)
                    .arg_required_else_help(true)
                    .next_help_heading("Serial port (Active device, GNSS receiver)")
                    .arg(
                        Arg::new("port")
                            .short('p')
                            .long("port")
                            .value_name("PORT")
                            .required_unless_present_any(["file"])
                            .help("Define serial port. Example /dev/ttyUSB0 on Linux")
                    )
                    .arg(
                        Arg::new("baudrate")
                            .short('b')
                            .long("baud")
                            .required(false)
                            .value_name("Baudrate (u32)")
                            .help("Define serial port baud rate. Communications will not work if your receiver streams at a different data-rate. By default we use 9600"),
                    )
                    .next_help_heading("Receiver configuration")
                    .arg(
                        Arg::new("hw-port")
                            .long("hw-port")
                            .value_name("A|B")
                            .action(ArgAction::Set)
                            .help("Receiver port the host is attached to. Default: A")
                    )
                    .arg(
                        Arg::new("rx")
                            .long("rx")
                            .value_name("Z12|UZ")
                            .action(ArgAction::Set)
                            .help("Receiver family, which defines how the GPS week is acquired. Default: Z12")
                    )
                    .arg(
                        Arg::new("week")
                            .long("week")
                            .value_name("WEEK")
                            .action(ArgAction::Set)
                            .help("Define the current (full) GPS week.
When not defined, it is acquired from the receiver in active mode, or deduced from system time in passive mode.")
                    )
                    .arg(
                        Arg::new("interval")
                            .long("interval")
                            .value_name("SECONDS")
                            .action(ArgAction::Set)
                            .help("Recording interval, in seconds. Default value is 30s (standard low-rate RINEX).")
                    )
                    .arg(
                        Arg::new("prn-max")
                            .long("prn-max")
                            .value_name("PRN")
                            .action(ArgAction::Set)
                            .help("Highest accepted PRN. Default: 31, as PRN 32 was never reported by the receiver interface.
Blocks of higher PRN are silently dropped.")
                    )
                    .arg(
                        Arg::new("no-stream")
                            .long("no-stream")
                            .action(ArgAction::SetTrue)
                            .help("Do not (re)start the MBEN/PBEN stream. Use this if your receiver is already streaming.")
                    )
                    .next_help_heading("File interface (Passive mode)")
                    .arg(
                        Arg::new("file")
                            .long("file")
                            .short('f')
                            .value_name("FILENAME")
                            .action(ArgAction::Append)
                            .required_unless_present_any(["port"])
                            .help("Load a single file. Use as many as needed.
Each file descriptor is consumed one after the other. You might have to load them according
to their sampling chronology to make sure. Gzip file are supported but they must be terminated with '.gz'")
                    )
                    .next_help_heading("Collection")
                    .arg(
                        Arg::new("name")
                            .long("name")
                            .short('n')
                            .required(false)
                            .action(ArgAction::Set)
                            .help("Define a custom name. To respect standard naming conventions,
this should be a 4 letter code, usually named after your geodetic marker.
When not defined, we use the site label programmed in the receiver.")
                    )
                    .arg(
                        Arg::new("prefix")
                            .long("prefix")
                            .required(false)
                            .help("Custom directory prefix for output products. Default is none!"),
                    )
                    .arg(
                        Arg::new("gzip")
                            .long("gzip")
                            .action(ArgAction::SetTrue)
                            .help("Gzip compress the output."))
                    .get_matches()
            },
        }
    }

    /// Returns User serial port specification
    pub fn serial_port(&self) -> Option<&String> {
        self.matches.get_one::<String>("port")
    }

    /// Input file paths
    pub fn filepaths(&self) -> Vec<&String> {
        if let Some(fp) = self.matches.get_many::<String>("file") {
            fp.collect()
        } else {
            Vec::new()
        }
    }

    /// Returns User baud rate specification
    pub fn baud_rate(&self) -> Option<u32> {
        let baud = self.matches.get_one::<String>("baudrate")?;
        let baud = baud
            .parse::<u32>()
            .unwrap_or_else(|e| panic!("Invalid baud rate value: {}", e));
        Some(baud)
    }

    /// Receiver port we're attached to
    pub fn hw_port(&self) -> char {
        match self.matches.get_one::<String>("hw-port") {
            Some(port) => match port.trim().to_uppercase().as_str() {
                "A" => 'A',
                "B" => 'B',
                other => panic!("Invalid receiver port \"{}\": expecting A or B", other),
            },
            None => 'A',
        }
    }

    pub fn receiver_model(&self) -> ReceiverModel {
        if let Some(model) = self.matches.get_one::<String>("rx") {
            ReceiverModel::from_str(model).unwrap_or_else(|e| panic!("Invalid receiver: {}", e))
        } else {
            ReceiverModel::default()
        }
    }

    /// User defined GPS week
    pub fn week(&self) -> Option<u32> {
        let week = self.matches.get_one::<String>("week")?;
        let week = week
            .trim()
            .parse::<u32>()
            .unwrap_or_else(|e| panic!("Invalid GPS week: {}", e));
        Some(week)
    }

    /// Recording interval (s)
    pub fn interval(&self) -> u32 {
        if let Some(interval) = self.matches.get_one::<String>("interval") {
            let interval = interval
                .trim()
                .parse::<u32>()
                .unwrap_or_else(|e| panic!("Invalid interval: {}", e));

            if interval == 0 {
                panic!("Recording interval must be at least 1s");
            }
            interval
        } else {
            30
        }
    }

    /// Highest accepted PRN
    pub fn prn_max(&self) -> Option<u8> {
        let prn = self.matches.get_one::<String>("prn-max")?;
        let prn = prn
            .trim()
            .parse::<u8>()
            .unwrap_or_else(|e| panic!("Invalid PRN: {}", e));

        if prn == 0 {
            panic!("Highest accepted PRN must be at least 1");
        }
        Some(prn)
    }

    /// True if we should start the binary stream
    pub fn streaming(&self) -> bool {
        !self.matches.get_flag("no-stream")
    }

    pub fn collecter_settings(&self) -> CollecterSettings {
        CollecterSettings {
            gzip: self.matches.get_flag("gzip"),
            prefix: self.matches.get_one::<String>("prefix").cloned(),
            name: self.matches.get_one::<String>("name").cloned(),
        }
    }
}
