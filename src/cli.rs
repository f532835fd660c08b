//! Minimal CLI parsing for run mode overrides.

use std::env;

use crate::app_mode::RunMode;

#[derive(Debug, Default)]
pub struct CliOptions {
    pub run_mode_override: Option<RunMode>,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    pub fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--grabbed" => options.run_mode_override = Some(RunMode::Grabbed),
                "--failed" => options.run_mode_override = Some(RunMode::Failed),
                "--run-mode" => {
                    if let Some(value) = args.next() {
                        options.run_mode_override = RunMode::from_arg(&value);
                    }
                }
                _ if arg.starts_with("--run-mode=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.run_mode_override = RunMode::from_arg(value);
                    }
                }
                _ => {}
            }
        }
        options
    }
}
