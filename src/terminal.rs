// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Command Interpreter
//!
//! Parses one line of terminal input into a [`Command`] and runs it against
//! a [`Session`].
//!
//! Tokenization is whitespace splitting; options are `--flag value` pairs.
//! Verbs are case-insensitive, flag values are taken verbatim.
//!
//! | Verb | Arguments |
//! |------|-----------|
//! | `send` | `--to <addr> --amount <n> [--from <addr>] [--key <hex>] [--nonce <n>]` |
//! | `balance` | `<addr>` |
//! | `faucet` | `[addr]` |
//! | `wallet` | `[new \| import <hex>]` |
//! | `blocks`, `mempool`, `health`, `help`, `clear` | none |

use std::fmt;

use chrono::DateTime;

use crate::blockchain::types::{Address, Amount};
use crate::chain_view::DataKind;
use crate::error::ClientError;
use crate::state::Session;

const SEND_USAGE: &str =
    "Usage: send --to <address> --amount <number> [--from <address> --key <privateKey>] [--nonce <n>]";
const BALANCE_USAGE: &str = "Usage: balance <address>";
const WALLET_USAGE: &str = "Usage: wallet [new | import <privateKey>]";
const FAUCET_USAGE: &str = "Usage: faucet [address]";

/// Rows shown by `blocks` and `mempool`.
const LISTING_LIMIT: usize = 10;

pub const HELP_TEXT: &str = "\
Available commands:
  send --to <address> --amount <number> [--from <address> --key <privateKey>] [--nonce <n>]
    Send tokens to an address. Uses the saved wallet if --from/--key are not provided.

  balance <address>
    Check the balance of an address.

  faucet [address]
    Request test funds for an address, or for the active wallet.

  wallet [new | import <privateKey>]
    Show, create or import the active wallet. New and imported keys are saved.

  blocks
    Show the most recent blocks.

  mempool
    Show pending transactions.

  health
    Check whether the node is reachable.

  help
    Show this help message.

  clear
    Clear the screen.

  exit
    Leave the terminal.

Examples:
  send --to 0x742d35Cc6634C0532925a3b844Bc454e4438f44e --amount 10
  balance 0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

/// Parse failures. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {verb}. Type 'help' for available commands.")]
    UnknownCommand { verb: String },

    #[error("Missing {flag}. {usage}")]
    MissingArgument {
        flag: &'static str,
        usage: &'static str,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Arguments of `send`.
#[derive(Clone, PartialEq)]
pub struct SendArgs {
    pub to: Address,
    pub amount: Amount,
    pub from: Option<Address>,
    pub key: Option<String>,
    pub nonce: Option<u64>,
}

impl fmt::Debug for SendArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendArgs")
            .field("to", &self.to)
            .field("amount", &self.amount)
            .field("from", &self.from)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("nonce", &self.nonce)
            .finish()
    }
}

#[derive(Clone, PartialEq)]
pub enum WalletAction {
    Show,
    New,
    Import(String),
}

impl fmt::Debug for WalletAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletAction::Show => f.write_str("Show"),
            WalletAction::New => f.write_str("New"),
            WalletAction::Import(_) => f.write_str("Import(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(SendArgs),
    Balance(Address),
    Faucet(Option<Address>),
    Wallet(WalletAction),
    Blocks,
    Mempool,
    Health,
    Help,
    Clear,
}

/// What the caller should do with a command's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Text(String),
    Clear,
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = tokens.collect();

    let command = match verb.to_lowercase().as_str() {
        "send" => Command::Send(parse_send(&args)?),
        "balance" => {
            let raw = single_positional(&args, BALANCE_USAGE)?.ok_or(
                CommandError::MissingArgument {
                    flag: "<address>",
                    usage: BALANCE_USAGE,
                },
            )?;
            Command::Balance(parse_address(raw)?)
        }
        "faucet" => Command::Faucet(
            single_positional(&args, FAUCET_USAGE)?
                .map(parse_address)
                .transpose()?,
        ),
        "wallet" => Command::Wallet(parse_wallet(&args)?),
        "blocks" => no_arguments(&args, Command::Blocks)?,
        "mempool" => no_arguments(&args, Command::Mempool)?,
        "health" => no_arguments(&args, Command::Health)?,
        "help" => Command::Help,
        "clear" => Command::Clear,
        other => {
            return Err(CommandError::UnknownCommand {
                verb: other.to_string(),
            })
        }
    };
    Ok(Some(command))
}

fn parse_send(args: &[&str]) -> Result<SendArgs, CommandError> {
    let mut to = None;
    let mut amount = None;
    let mut from = None;
    let mut key = None;
    let mut nonce = None;

    let mut iter = args.iter();
    while let Some(&flag) = iter.next() {
        let slot = match flag {
            "--to" => &mut to,
            "--amount" => &mut amount,
            "--from" => &mut from,
            "--key" => &mut key,
            "--nonce" => &mut nonce,
            other if other.starts_with("--") => {
                return Err(CommandError::InvalidArgument(format!(
                    "unknown flag {other}. {SEND_USAGE}"
                )))
            }
            other => {
                return Err(CommandError::InvalidArgument(format!(
                    "unexpected `{other}`. {SEND_USAGE}"
                )))
            }
        };
        let value = iter.next().ok_or(CommandError::MissingArgument {
            flag: static_flag(flag),
            usage: SEND_USAGE,
        })?;
        *slot = Some(*value);
    }

    let to = to.ok_or(CommandError::MissingArgument {
        flag: "--to",
        usage: SEND_USAGE,
    })?;
    let amount = amount.ok_or(CommandError::MissingArgument {
        flag: "--amount",
        usage: SEND_USAGE,
    })?;

    let amount = Amount::parse(amount).map_err(|e| CommandError::InvalidArgument(e.to_string()))?;
    if !amount.is_positive() {
        return Err(CommandError::InvalidArgument(
            "amount must be greater than zero".to_string(),
        ));
    }

    let nonce = nonce
        .map(|raw| match raw.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(CommandError::InvalidArgument(format!(
                "nonce must be a positive integer, got `{raw}`"
            ))),
        })
        .transpose()?;

    Ok(SendArgs {
        to: parse_address(to)?,
        amount,
        from: from.map(parse_address).transpose()?,
        key: key.map(str::to_string),
        nonce,
    })
}

fn parse_wallet(args: &[&str]) -> Result<WalletAction, CommandError> {
    match args {
        [] => Ok(WalletAction::Show),
        [sub] if sub.eq_ignore_ascii_case("new") => Ok(WalletAction::New),
        [sub] if sub.eq_ignore_ascii_case("import") => Err(CommandError::MissingArgument {
            flag: "<privateKey>",
            usage: WALLET_USAGE,
        }),
        [sub, key] if sub.eq_ignore_ascii_case("import") => {
            Ok(WalletAction::Import(key.to_string()))
        }
        _ => Err(CommandError::InvalidArgument(WALLET_USAGE.to_string())),
    }
}

fn single_positional<'a>(
    args: &[&'a str],
    usage: &'static str,
) -> Result<Option<&'a str>, CommandError> {
    match args {
        [] => Ok(None),
        [one] => Ok(Some(one)),
        _ => Err(CommandError::InvalidArgument(usage.to_string())),
    }
}

fn no_arguments(args: &[&str], command: Command) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(CommandError::InvalidArgument(format!(
            "unexpected arguments: {}",
            args.join(" ")
        )))
    }
}

fn parse_address(raw: &str) -> Result<Address, CommandError> {
    Address::parse(raw).map_err(|e| CommandError::InvalidArgument(e.to_string()))
}

fn static_flag(flag: &str) -> &'static str {
    match flag {
        "--to" => "--to",
        "--amount" => "--amount",
        "--from" => "--from",
        "--key" => "--key",
        _ => "--nonce",
    }
}

// =============================================================================
// Execution
// =============================================================================

/// Parse and run one line.
pub async fn run_line(session: &Session, line: &str) -> Result<Option<Output>, ClientError> {
    match parse(line)? {
        Some(command) => execute(session, command).await.map(Some),
        None => Ok(None),
    }
}

pub async fn execute(session: &Session, command: Command) -> Result<Output, ClientError> {
    let text = match command {
        Command::Send(args) => {
            let outcome = session.send(args).await?;
            format!(
                "Transaction submitted successfully: status={} nonce={} id={}",
                outcome.receipt.status, outcome.nonce, outcome.tx_id
            )
        }
        Command::Balance(address) => {
            let balance = session.balance(&address).await?;
            format!("Balance for {address}: {balance}")
        }
        Command::Faucet(address) => {
            let receipt = session.faucet(address).await?;
            format!(
                "Faucet credited {} to {}. New balance: {}",
                receipt.amount, receipt.address, receipt.balance
            )
        }
        Command::Wallet(WalletAction::Show) => match session.keys().active_address() {
            Some(address) => format!("Active wallet: {address}"),
            None => "No wallet. Use `wallet new` or `wallet import <privateKey>`.".to_string(),
        },
        Command::Wallet(WalletAction::New) => {
            let material = session.create_wallet()?;
            format!("Created wallet {}", material.address())
        }
        Command::Wallet(WalletAction::Import(key)) => {
            let material = session.import_wallet(&key)?;
            format!("Imported wallet {}", material.address())
        }
        Command::Blocks => render_blocks(session).await,
        Command::Mempool => render_mempool(session).await,
        Command::Health => {
            if session.health().await {
                format!("Node at {} is healthy", session.client().base_url())
            } else {
                format!("Node at {} is unreachable", session.client().base_url())
            }
        }
        Command::Help => HELP_TEXT.to_string(),
        Command::Clear => return Ok(Output::Clear),
    };
    Ok(Output::Text(text))
}

async fn render_blocks(session: &Session) -> String {
    let view = session.view().read().await;
    let mut lines = Vec::new();
    if view.blocks().is_empty() {
        lines.push("No blocks yet".to_string());
    }
    for block in view.blocks().iter().take(LISTING_LIMIT) {
        let time = DateTime::from_timestamp(block.timestamp, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| block.timestamp.to_string());
        lines.push(format!(
            "#{:<6} {}  txs={:<3} {}",
            block.number,
            short(&block.hash),
            block.tx_count(),
            time
        ));
    }
    if let Some(error) = view.last_error(DataKind::Blocks) {
        lines.push(format!("(last refresh failed: {error})"));
    }
    lines.join("\n")
}

async fn render_mempool(session: &Session) -> String {
    let view = session.view().read().await;
    let mut lines = vec![format!("{} pending", view.mempool().len())];
    for entry in view.mempool().iter().take(LISTING_LIMIT) {
        lines.push(format!(
            "{}  {} -> {}  amount={} nonce={}",
            short(&entry.id()),
            entry.from,
            entry.to,
            entry.amount,
            entry.nonce
        ));
    }
    if let Some(error) = view.last_error(DataKind::Mempool) {
        lines.push(format!("(last refresh failed: {error})"));
    }
    lines.join("\n")
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
