use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Prints `value` in the chosen format; `human` renders it with `describe`.
    pub fn emit<T: Serialize>(self, value: &T, describe: impl FnOnce(&T) -> String) -> Result<()> {
        match self {
            OutputFormat::Human => println!("{}", describe(value)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        }
        Ok(())
    }
}
