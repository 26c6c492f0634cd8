use std::str::FromStr;

use hifitime::{
    efmt::Format,
    prelude::{Epoch, Formatter},
};

/// Default station name, when neither defined by User nor by the receiver
const DEFAULT_NAME: &str = "ASHT";

#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// GZIP compression
    pub gzip: bool,

    /// Custom name. Defaults to the receiver site label.
    pub name: Option<String>,

    /// Custom file prefix
    pub prefix: Option<String>,
}

impl Settings {
    /// Output file path, for a session starting at `t`.
    /// `site` is the label programmed in the receiver.
    pub fn filename(&self, site: &str, t: Epoch) -> String {
        let mut filepath = if let Some(prefix) = &self.prefix {
            format!("{}/", prefix)
        } else {
            "".to_string()
        };

        filepath.push_str(&self.short_filename(site, t));
        filepath
    }

    fn name(&self, site: &str) -> String {
        let name = match &self.name {
            Some(name) => name.as_str(),
            None if !site.trim().is_empty() => site.trim(),
            None => DEFAULT_NAME,
        };

        name.to_uppercase()
    }

    /// V2 like file name: NAME, day of year, 2 digit year
    fn short_filename(&self, site: &str, t: Epoch) -> String {
        let (y, _, _, _, _, _, _) = t.to_gregorian_utc();

        let mut formatted = self.name(site);

        match Format::from_str("%j") {
            Ok(fmt) => formatted.push_str(&Formatter::new(t, fmt).to_string()),
            Err(_) => formatted.push_str("000"),
        }

        formatted.push('.');
        formatted.push_str(&format!("{:02}", y.rem_euclid(100)));
        formatted.push_str(".json");

        if self.gzip {
            formatted.push_str(".gz")
        }

        formatted
    }
}
