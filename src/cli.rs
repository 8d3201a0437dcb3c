//! 命令行界面定义
//!
//! 定义了主程序的命令行参数和选项
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use securecode::{KeyId, Nonce};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "discountd")]
#[command(version)]
#[command(
    about = "Anti-replay discount codes: nonce authority service and issue/verify tooling"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,

    /// Configuration file path (defaults to searching standard locations)
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub(crate) config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Test configuration file
    Test {
        /// Configuration file path (optional, defaults to config.toml)
        #[arg(index = 1)]
        config_file: Option<PathBuf>,
    },

    /// Generate a new signing key in keys_dir and print its key id
    Keygen,

    /// Issue discount codes, one per line
    Issue {
        /// Signing key id (8 hex characters)
        #[arg(long)]
        key_id: KeyId,

        /// Item identifier
        #[arg(long)]
        item: String,

        /// Discounted price
        #[arg(long)]
        price: u32,

        /// Expiry as a Unix timestamp
        #[arg(long, conflicts_with = "date", required_unless_present = "date")]
        expires: Option<i64>,

        /// Last valid day (YYYY-MM-DD); the code expires at 06:00 the next day
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Number of codes to issue
        #[arg(long, default_value_t = 1)]
        quantity: usize,
    },

    /// Check a code without consuming it (prints VALID or INVALID)
    Verify {
        code: String,
    },

    /// Check a code and consume its nonce (prints VALID or INVALID)
    Redeem {
        code: String,
    },

    /// Consume a nonce directly
    Consume {
        nonce: Nonce,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_requires_expiry() {
        let result = Cli::try_parse_from([
            "discountd", "issue", "--key-id", "ACE84362", "--item", "SKU", "--price", "100",
        ]);
        assert!(result.is_err());

        let result = Cli::try_parse_from([
            "discountd", "issue", "--key-id", "ACE84362", "--item", "SKU", "--price", "100",
            "--expires", "1651813200", "--date", "2022-05-05",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_issue_with_date() {
        let cli = Cli::try_parse_from([
            "discountd", "--config", "custom.toml", "issue", "--key-id", "ACE84362", "--item",
            "SKU", "--price", "100", "--date", "2022-05-05", "--quantity", "3",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        match cli.command {
            Some(Commands::Issue {
                key_id,
                date,
                expires,
                quantity,
                ..
            }) => {
                assert_eq!(key_id.to_string(), "ACE84362");
                assert_eq!(date, NaiveDate::from_ymd_opt(2022, 5, 5));
                assert_eq!(expires, None);
                assert_eq!(quantity, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_consume_rejects_bad_nonce() {
        assert!(Cli::try_parse_from(["discountd", "consume", "not-a-nonce"]).is_err());
        assert!(Cli::try_parse_from(["discountd", "consume", "40302ADD670A0655"]).is_ok());
    }
}
