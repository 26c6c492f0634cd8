#![doc(
    html_logo_url = "https://raw.githubusercontent.com/nav-solutions/.github/master/logos/logo2.jpg"
)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::type_complexity)]

/*
 * ASH2RINEX is part of the nav-solutions framework.
 * Authors: Guillaume W. Bres <guillaume.bressaix@gmail.com> et al,
 * (cf. https://github.com/nav-solutions/rinex/graphs/contributors)
 * (cf. https://github.com/nav-solutions/ash2rinex/graphs/contributors)
 * This framework is shipped under Mozilla Public V2 license.
 *
 * Documentation: https://github.com/nav-solutions/ash2rinex
 */

extern crate gnss_rs as gnss;

use env_logger::{Builder, Target};

use log::{error, info, warn};

use tokio::{
    signal,
    sync::{mpsc, watch},
};

use hifitime::prelude::{Duration, Epoch, TimeScale};

mod cli;
mod collecter;
mod device;
mod message;
mod runtime;
mod session;

use crate::{
    cli::Cli,
    collecter::{Message, observation::Collecter},
    device::Device,
    session::Session,
};

/// Default baud rate of the Z-12 serial ports
const DEFAULT_BAUD_RATE: u32 = 9600;

/// GPS week acquisition timeout
const WEEK_ACQUISITION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[tokio::main]
pub async fn main() {
    let mut builder = Builder::from_default_env();

    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    let cfg_precision = Duration::from_seconds(1.0);

    let t_gpst = Epoch::now()
        .unwrap_or_else(|e| panic!("Failed to determine system time: {}", e))
        .to_time_scale(TimeScale::GPST);

    // cli
    let cli = Cli::new();

    // Input interface
    let mut device = if let Some(serial) = cli.serial_port() {
        // active mode (receiver)
        let baud_rate = cli.baud_rate().unwrap_or(DEFAULT_BAUD_RATE);
        Device::open_serial_port(serial, baud_rate)
    } else {
        // passive mode (input files)
        let user_files = cli.filepaths();
        let total = user_files.len();

        assert!(
            total > 0,
            "invalid command line: requires either serial port or at least, one input file"
        );

        let mut device = Device::open_file(user_files[0]);

        for fp in user_files.iter().skip(1) {
            device.stack_file(fp);
        }

        device
    };

    let hw_port = cli.hw_port();
    let (system_week, _) = t_gpst.to_time_of_week();

    // GPS week
    let week = if let Some(week) = cli.week() {
        week
    } else if !device.is_read_only() {
        match device.acquire_week(
            cli.receiver_model(),
            hw_port,
            system_week,
            WEEK_ACQUISITION_TIMEOUT,
        ) {
            Ok(Some(week)) => week,
            Ok(None) => {
                warn!("GPS week deduced from system time");
                system_week
            },
            Err(e) => panic!("GPS week acquisition: I/O error: {}", e),
        }
    } else {
        warn!("passive mode: GPS week deduced from system time, use --week to define it");
        system_week
    };

    // Device configuration
    if !device.is_read_only() && cli.streaming() {
        device
            .start_streaming(hw_port, cli.interval())
            .unwrap_or_else(|e| panic!("Failed to start MBEN/PBEN stream: {}", e));
    }

    // shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Observations
    let (obs_tx, obs_rx) = mpsc::channel(128);

    let mut collecter = Collecter::new(cli.collecter_settings(), obs_rx);

    let collecter_handle = tokio::spawn(async move {
        info!("{} - Observation mode deployed", t_gpst.round(cfg_precision));
        collecter.run().await;
    });

    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .unwrap_or_else(|e| panic!("Tokio signal handling error: {}", e));

        session::request_shutdown(&shutdown_tx);
    });

    // main task
    info!(
        "{} - application deployed (GPS week {})",
        t_gpst.round(cfg_precision),
        week
    );

    let mut sink = obs_tx.clone();
    let prn_max = cli.prn_max();

    let session = tokio::task::spawn_blocking(move || {
        let mut session = Session::new(week);

        if let Some(prn_max) = prn_max {
            session = session.with_prn_range(1..prn_max.saturating_add(1));
        }

        let result = session.run(&mut device, &mut sink, &shutdown_rx);
        (session, result)
    });

    match session.await {
        Ok((session, result)) => {
            if let Err(e) = result {
                error!("I/O error: {}", e);
            }

            if let Some(first) = session.time().first_observation() {
                info!("first observation: {}", first);
            }

            if let Some(fix) = session.last_fix() {
                info!("{} - last fix ({})", fix.epoch, fix.record.site);
            }

            info!("{} epoch(s) synchronized", session.counters().epochs);
        },
        Err(e) => error!("session error: {}", e),
    }

    if obs_tx.send(Message::Shutdown).await.is_err() {
        error!("collecter already terminated");
    }

    if let Err(e) = collecter_handle.await {
        error!("collecter error: {}", e);
    }
}
