//! `ledger` subcommands backed by the `SQLite` journal.

use rich_rust::{Segment, Style};
use serde::Serialize;

use crate::cli::args::{LedgerCommand, OutputFormat};
use crate::cli::context::{AppContext, parse_amount, parse_choice};
use crate::cli::output::RobotOutput;
use crate::cli::render::{Align, Theme, cell, gap, panel};
use crate::core::ledger::{
    CreditAccount, CreditKind, CreditLedger, LedgerReceipt, RejectedDebit, Transaction,
    TransactionMeta,
};
use crate::error::{Result, RouterError};
use crate::util::format::format_credits;
use crate::util::time::format_relative_time;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptView<'a> {
    account_id: &'a str,
    #[serde(flatten)]
    receipt: LedgerReceipt,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryView {
    account_id: String,
    transactions: Vec<Transaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<Vec<RejectedDebit>>,
}

/// Execute a ledger subcommand.
///
/// # Errors
/// Returns argument errors, journal errors, and the ledger's own rejections
/// (`InsufficientFunds`, `SpendingCapExceeded`, `InvalidAmount`,
/// `AccountNotFound`).
pub fn execute(ctx: &AppContext, command: &LedgerCommand) -> Result<()> {
    let ledger = ctx.ledger()?;
    match command {
        LedgerCommand::Credit {
            account,
            amount,
            kind,
            note,
        } => {
            let kind = parse_choice(
                "credit kind",
                kind,
                "purchase, refund, bonus, adjustment",
                CreditKind::from_arg,
            )?;
            let amount = parse_amount("amount", amount)?;
            let receipt = ledger.credit(account, amount, kind, meta(note.as_deref()))?;
            print_receipt(ctx, "ledger credit", account, receipt)
        }
        LedgerCommand::Debit {
            account,
            amount,
            note,
        } => {
            let amount = parse_amount("amount", amount)?;
            let receipt = ledger.debit(account, amount, meta(note.as_deref()))?;
            print_receipt(ctx, "ledger debit", account, receipt)
        }
        LedgerCommand::Balance { account } => balance(ctx, &ledger, account.as_deref()),
        LedgerCommand::History {
            account,
            limit,
            rejected,
        } => history(ctx, &ledger, account, *limit, *rejected),
        LedgerCommand::Cap {
            account,
            amount,
            clear,
        } => {
            let cap = if *clear {
                None
            } else {
                amount
                    .as_deref()
                    .map(|raw| parse_amount("cap", raw))
                    .transpose()?
            };
            ledger.set_monthly_cap(account, cap)?;
            let view = ledger
                .account(account)
                .ok_or_else(|| RouterError::AccountNotFound(account.clone()))?;
            match ctx.format {
                OutputFormat::Json => ctx.print_json(&RobotOutput::new("ledger cap", &view)),
                OutputFormat::Human => {
                    match view.monthly_cap {
                        Some(cap) => println!("{account}: monthly cap {}", format_credits(cap)),
                        None => println!("{account}: monthly cap cleared"),
                    }
                    Ok(())
                }
            }
        }
    }
}

fn meta(note: Option<&str>) -> TransactionMeta {
    note.map(TransactionMeta::note).unwrap_or_default()
}

fn print_receipt(
    ctx: &AppContext,
    command: &str,
    account_id: &str,
    receipt: LedgerReceipt,
) -> Result<()> {
    match ctx.format {
        OutputFormat::Json => ctx.print_json(&RobotOutput::new(
            command,
            ReceiptView {
                account_id,
                receipt,
            },
        )),
        OutputFormat::Human => {
            println!(
                "{account_id}: balance {} (tx #{})",
                format_credits(receipt.balance),
                receipt.tx_id
            );
            Ok(())
        }
    }
}

fn balance(ctx: &AppContext, ledger: &CreditLedger, account: Option<&str>) -> Result<()> {
    let accounts: Vec<CreditAccount> = match account {
        Some(id) => vec![
            ledger
                .account(id)
                .ok_or_else(|| RouterError::AccountNotFound(id.to_string()))?,
        ],
        None => ledger
            .account_ids()
            .iter()
            .filter_map(|id| ledger.account(id))
            .collect(),
    };

    match ctx.format {
        OutputFormat::Json => ctx.print_json(&RobotOutput::new("ledger balance", &accounts)),
        OutputFormat::Human => {
            print!("{}", render_accounts(&accounts, &ctx.theme));
            Ok(())
        }
    }
}

fn render_accounts(accounts: &[CreditAccount], theme: &Theme) -> String {
    if accounts.is_empty() {
        return "No ledger accounts.\n".to_string();
    }
    let mut lines = vec![vec![
        cell("Account", 24, Align::Left, &theme.header),
        gap(),
        cell("Balance", 14, Align::Right, &theme.header),
        gap(),
        cell("Month spent", 14, Align::Right, &theme.header),
        gap(),
        cell("Monthly cap", 14, Align::Right, &theme.header),
    ]];
    for account in accounts {
        let capped = account
            .monthly_cap
            .is_some_and(|cap| account.month_spent >= cap);
        lines.push(vec![
            cell(&account.id, 24, Align::Left, &Style::new()),
            gap(),
            cell(&format_credits(account.balance), 14, Align::Right, &theme.accent),
            gap(),
            cell(
                &format_credits(account.month_spent),
                14,
                Align::Right,
                if capped { &theme.warning } else { &theme.muted },
            ),
            gap(),
            cell(
                &account
                    .monthly_cap
                    .map_or_else(|| "none".to_string(), format_credits),
                14,
                Align::Right,
                &theme.muted,
            ),
        ]);
    }
    panel("Ledger accounts", lines, theme)
}

fn history(
    ctx: &AppContext,
    ledger: &CreditLedger,
    account: &str,
    limit: usize,
    include_rejected: bool,
) -> Result<()> {
    if !ledger.contains(account) && ledger.rejections(account).is_empty() {
        return Err(RouterError::AccountNotFound(account.to_string()));
    }
    let transactions: Vec<Transaction> = ledger
        .transactions(account)
        .into_iter()
        .rev()
        .take(limit)
        .collect();
    let rejected = include_rejected.then(|| {
        ledger
            .rejections(account)
            .into_iter()
            .rev()
            .take(limit)
            .collect::<Vec<_>>()
    });

    match ctx.format {
        OutputFormat::Json => ctx.print_json(&RobotOutput::new(
            "ledger history",
            HistoryView {
                account_id: account.to_string(),
                transactions,
                rejected,
            },
        )),
        OutputFormat::Human => {
            print!(
                "{}",
                render_history(account, &transactions, rejected.as_deref(), &ctx.theme)
            );
            Ok(())
        }
    }
}

fn render_history(
    account: &str,
    transactions: &[Transaction],
    rejected: Option<&[RejectedDebit]>,
    theme: &Theme,
) -> String {
    let mut lines = vec![vec![
        cell("Tx", 6, Align::Right, &theme.header),
        gap(),
        cell("Kind", 11, Align::Left, &theme.header),
        gap(),
        cell("Amount", 12, Align::Right, &theme.header),
        gap(),
        cell("Balance", 12, Align::Right, &theme.header),
        gap(),
        Segment::styled(" When".to_string(), theme.header.clone()),
    ]];
    for tx in transactions {
        let detail = match (&tx.meta.provider_id, &tx.meta.model_id, &tx.meta.note) {
            (Some(provider), Some(model), _) => format!("  {provider}/{model}"),
            (_, _, Some(note)) => format!("  {note}"),
            _ => String::new(),
        };
        lines.push(vec![
            cell(&tx.id.to_string(), 6, Align::Right, &theme.muted),
            gap(),
            cell(tx.kind.as_str(), 11, Align::Left, &Style::new()),
            gap(),
            cell(&format_credits(tx.amount), 12, Align::Right, &theme.accent),
            gap(),
            cell(&format_credits(tx.balance_after), 12, Align::Right, &Style::new()),
            gap(),
            Segment::plain(format!(" {}", format_relative_time(tx.created_at))),
            Segment::styled(detail, theme.muted.clone()),
        ]);
    }

    if let Some(rejected) = rejected {
        lines.push(Vec::new());
        lines.push(vec![Segment::styled("Rejected debits:".to_string(), theme.header.clone())]);
        if rejected.is_empty() {
            lines.push(vec![Segment::styled("  none".to_string(), theme.muted.clone())]);
        }
        for r in rejected {
            lines.push(vec![
                Segment::styled(format!("  {}", r.reason.as_str()), theme.warning.clone()),
                Segment::plain(format!(
                    " requested {} with balance {}",
                    format_credits(r.amount),
                    format_credits(r.balance),
                )),
                Segment::styled(
                    format!("  {}", format_relative_time(r.attempted_at)),
                    theme.muted.clone(),
                ),
            ]);
        }
    }
    panel(&format!("History: {account}"), lines, theme)
}
