use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub(crate) const DOTENV_FILE_NAME: &str = ".env";

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Loads `KEY=value` pairs from `<dir>/.env` into the process environment.
///
/// Variables that are already set keep their value. A missing file yields
/// `Ok(None)`.
pub(crate) fn load_dotenv_from(dir: &Path) -> Result<Option<PathBuf>> {
    let path = dir.join(DOTENV_FILE_NAME);
    match dotenvy::from_path(&path) {
        Ok(()) => Ok(Some(path)),
        Err(error) if error.not_found() => Ok(None),
        Err(error) => Err(error).with_context(|| format!("failed to load {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tempfile::tempdir;

    use super::{load_dotenv_from, DOTENV_FILE_NAME};
    use crate::cli_args::Cli;

    #[test]
    fn functional_load_dotenv_from_supplies_slack_app_token() {
        if std::env::var_os("SLACK_APP_TOKEN").is_some() {
            return;
        }
        let temp = tempdir().expect("tempdir");
        std::fs::write(
            temp.path().join(DOTENV_FILE_NAME),
            "# goosebot deployment\nSLACK_APP_TOKEN=xapp-from-dotenv\n",
        )
        .expect("write .env");

        let loaded = load_dotenv_from(temp.path()).expect("load .env");
        assert_eq!(loaded, Some(temp.path().join(DOTENV_FILE_NAME)));

        let cli = Cli::try_parse_from(["goosebot", "--slack-bot-token", "xoxb-test"])
            .expect("app token comes from .env");
        assert_eq!(cli.slack_app_token, "xapp-from-dotenv");
    }

    #[test]
    fn unit_load_dotenv_from_keeps_existing_environment() {
        std::env::set_var("GOOSEBOT_DOTENV_PRESET", "from-process");
        let temp = tempdir().expect("tempdir");
        std::fs::write(
            temp.path().join(DOTENV_FILE_NAME),
            "GOOSEBOT_DOTENV_PRESET=from-file\nGOOSEBOT_DOTENV_FRESH=from-file\n",
        )
        .expect("write .env");

        load_dotenv_from(temp.path()).expect("load .env");

        assert_eq!(
            std::env::var("GOOSEBOT_DOTENV_PRESET").expect("preset var"),
            "from-process"
        );
        assert_eq!(
            std::env::var("GOOSEBOT_DOTENV_FRESH").expect("fresh var"),
            "from-file"
        );
    }

    #[test]
    fn unit_load_dotenv_from_tolerates_missing_file() {
        let temp = tempdir().expect("tempdir");
        assert_eq!(load_dotenv_from(temp.path()).expect("missing .env"), None);
    }

    #[test]
    fn regression_load_dotenv_from_reports_malformed_file() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(
            temp.path().join(DOTENV_FILE_NAME),
            "GOOSEBOT_DOTENV_BROKEN='unterminated\n",
        )
        .expect("write .env");

        let error = load_dotenv_from(temp.path()).expect_err("malformed .env");
        assert!(error.to_string().contains("failed to load"));
    }
}
