use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "amm_ledger",
    version,
    about = "Sync AMM swap history and derive trades and pool balances"
)]
pub struct CliArgs {
    /// Account addresses to sync
    #[arg(required = true, value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Configuration file
    #[arg(long = "config", value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    /// Start of the trade window: unix seconds, 30d, 12h, 2024-01-15 or RFC 3339
    #[arg(long, default_value = "0", value_name = "TIME")]
    pub from: String,

    /// End of the trade window, same formats (default: now)
    #[arg(long, value_name = "TIME")]
    pub to: Option<String>,

    /// Also write the trades to a CSV file
    #[arg(long = "csv", value_name = "PATH")]
    pub csv_path: Option<PathBuf>,

    /// Print the priced pool balances of the addresses
    #[arg(long)]
    pub balances: bool,

    /// Drop stored swaps and sync ranges before syncing
    #[arg(long)]
    pub reset: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_parse_full_command_line() {
        let parsed = CliArgs::try_parse_from([
            "amm_ledger", "--config", "amm.toml", "0xabc", "--from", "30d", "--csv", "trades.csv",
            "--balances", "0xdef",
        ])
        .unwrap();

        assert_eq!(parsed.addresses, vec!["0xabc", "0xdef"]);
        assert_eq!(parsed.config_path, Some(PathBuf::from("amm.toml")));
        assert_eq!(parsed.from, "30d");
        assert_eq!(parsed.to, None);
        assert_eq!(parsed.csv_path, Some(PathBuf::from("trades.csv")));
        assert!(parsed.balances);
        assert!(!parsed.reset);
    }

    #[test]
    fn test_defaults() {
        let parsed = CliArgs::try_parse_from(["amm_ledger", "0xabc", "--reset"]).unwrap();
        assert_eq!(parsed.from, "0");
        assert!(parsed.config_path.is_none());
        assert!(parsed.reset);
    }

    #[test]
    fn test_parse_errors() {
        let missing = CliArgs::try_parse_from(["amm_ledger"]).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredArgument);

        assert!(CliArgs::try_parse_from(["amm_ledger", "0xabc", "--from"]).is_err());
        assert!(CliArgs::try_parse_from(["amm_ledger", "0xabc", "--verbose"]).is_err());

        let help = CliArgs::try_parse_from(["amm_ledger", "--help"]).unwrap_err();
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);
    }
}
