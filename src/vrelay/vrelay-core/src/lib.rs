/*
 * vSMTP mail transfer agent
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
*/

//! vRelay: accept mails over SMTP from local applications and send them
//! through the Gmail API, as a delegated mailbox.

#![doc(html_no_source)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
//
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
//
#![allow(clippy::multiple_crate_versions)]

mod args;

pub use args::{Args, Commands};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vrelay_config::Config;

macro_rules! get_fmt {
    () => {{
        #[cfg(debug_assertions)]
        {
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_target(true)
                .with_ansi(false)
        }

        #[cfg(not(debug_assertions))]
        {
            tracing_subscriber::fmt::layer()
                .compact()
                .with_thread_ids(false)
                .with_target(false)
                .with_ansi(false)
        }
    }};
}

macro_rules! file_writer {
    ($filepath:expr) => {{
        let filepath = $filepath;
        let parent = filepath
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let Some(file_name) = filepath.file_name() else {
            anyhow::bail!("filepath '{}' has no file name", filepath.display());
        };
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create log directory '{}'", parent.display()))?;

        tracing_appender::rolling::never(parent, file_name)
    }};
}

/// Build the level filter: the directives of `RUST_LOG` when it is set,
/// invalid ones being reported and skipped, those of the configuration otherwise.
fn env_filter(config: &Config, rust_log: Option<String>) -> tracing_subscriber::EnvFilter {
    match rust_log {
        Some(directives) => tracing_subscriber::EnvFilter::builder()
            .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
            .parse_lossy(directives),
        None => config
            .server
            .logs
            .level
            .iter()
            .fold(tracing_subscriber::EnvFilter::default(), |filter, directive| {
                filter.add_directive(directive.clone())
            }),
    }
}

/// Initialize the tracing subsystem.
///
/// The logs are written on the standard output, or in the file of the configuration.
///
/// # Errors
///
/// * the log file cannot be opened
/// * a global subscriber is already set
pub fn init_logs(config: &Config) -> anyhow::Result<()> {
    let file = match &config.server.logs.filename {
        Some(filename) => Some(get_fmt!().with_writer(file_writer!(filename))),
        None => None,
    };
    let stdout = file
        .is_none()
        .then(|| get_fmt!().with_writer(std::io::stdout).with_ansi(true));

    tracing_subscriber::registry()
        .with(env_filter(
            config,
            std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok(),
        ))
        .with(file)
        .with(stdout)
        .try_init()?;

    tracing::info!(
        filter = ?config.server.logs.level,
        "vRelay logs initialized"
    );

    Ok(())
}

/// Difference, line by line, between the default configuration and `config`.
///
/// # Errors
///
/// * the configurations cannot be serialized
pub fn config_diff(config: &Config) -> anyhow::Result<String> {
    let default = Config {
        server: vrelay_config::field::FieldServer::default(),
        relay: config.relay.clone(),
    };
    let default = serde_json::to_string_pretty(&default)?;
    let loaded = serde_json::to_string_pretty(config)?;

    let mut out = String::new();
    for line in diff::lines(&default, &loaded) {
        match line {
            diff::Result::Left(l) => out.push_str(&format!("-{l}\n")),
            diff::Result::Both(l, _) => out.push_str(&format!(" {l}\n")),
            diff::Result::Right(r) => out.push_str(&format!("+{r}\n")),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(extra: &[&str]) -> Config {
        Args::try_parse_from(
            [
                "vrelay",
                "-f",
                "service_account.json",
                "-u",
                "relay@example.com",
                "-e",
                "no-reply@example.com",
            ]
            .iter()
            .chain(extra),
        )
        .unwrap()
        .to_config()
        .unwrap()
    }

    #[test]
    fn debug_not_compiled_out() {
        assert!(tracing::level_filters::STATIC_MAX_LEVEL >= tracing::level_filters::LevelFilter::DEBUG);
    }

    #[test]
    fn filter_from_config() {
        let filter = env_filter(&config(&["--debug"]), None).to_string();
        assert!(filter.contains("vrelay_server=debug"), "{filter}");
        assert!(filter.contains("vrelay_auth=debug"), "{filter}");
        assert!(!filter.split(',').any(|d| d == "debug"), "{filter}");

        let filter = env_filter(&config(&[]), None).to_string();
        assert_eq!(filter, "info");
    }

    #[test]
    fn filter_from_rust_log() {
        let filter = env_filter(
            &config(&["--debug"]),
            Some("hyper=trace,vrelay_server=[".to_owned()),
        )
        .to_string();
        assert!(filter.contains("hyper=trace"), "{filter}");
        assert!(!filter.contains("vrelay_server"), "{filter}");
    }

    #[test]
    fn no_diff_on_default() {
        let diff = config_diff(&config(&[])).unwrap();
        assert!(diff.lines().all(|l| l.starts_with(' ')), "{diff}");
    }

    #[test]
    fn diff_on_port() {
        let diff = config_diff(&config(&["-p", "10025"])).unwrap();
        assert!(
            diff.lines()
                .any(|l| l.starts_with('-') && l.contains("\"0.0.0.0:2525\"")),
            "{diff}"
        );
        assert!(
            diff.lines()
                .any(|l| l.starts_with('+') && l.contains("\"0.0.0.0:10025\"")),
            "{diff}"
        );
    }
}
