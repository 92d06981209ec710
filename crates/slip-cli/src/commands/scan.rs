//! Scan command - extract an expense from a single receipt image.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use slip_core::{ReceiptExtractor, ScannedExpense};

/// Arguments for the scan command.
#[derive(Args)]
pub struct ScanArgs {
    /// Receipt image file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// MIME type declared for the image (default from config: image/jpeg)
    #[arg(long)]
    mime_type: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output, one row per line item
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ScanArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = super::load_config(config_path)?;
    if let Some(mime_type) = &args.mime_type {
        config.api.mime_type = mime_type.clone();
    }
    if let Some(timeout) = args.timeout {
        config.api.timeout_secs = timeout;
    }

    // Check input file exists
    if !args.input.is_file() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let extractor = ReceiptExtractor::from_config(&config)?;

    info!("Scanning receipt: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Waiting for inference API...");

    let result = extractor.extract(&args.input).await;
    pb.finish_and_clear();
    let expense = result?;

    let output = format_expense(&expense, args.format, args.pretty)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

fn format_expense(expense: &ScannedExpense, format: OutputFormat, pretty: bool) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json if pretty => Ok(serde_json::to_string_pretty(expense)?),
        OutputFormat::Json => Ok(serde_json::to_string(expense)?),
        OutputFormat::Csv => format_csv(expense),
        OutputFormat::Text => Ok(format_text(expense)),
    }
}

fn format_csv(expense: &ScannedExpense) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "id",
        "merchant",
        "amount",
        "date",
        "category",
        "description",
        "item_name",
        "item_quantity",
        "item_price",
    ])?;

    let amount = expense.amount.to_string();
    let head = [
        expense.id.as_str(),
        expense.merchant.as_str(),
        amount.as_str(),
        expense.date.as_str(),
        expense.category.as_str(),
        expense.description.as_str(),
    ];

    if expense.items.is_empty() {
        wtr.write_record(head.iter().copied().chain(["", "", ""]))?;
    }

    for item in &expense.items {
        let quantity = item.quantity.to_string();
        let price = item.price.to_string();
        wtr.write_record(
            head.iter()
                .copied()
                .chain([item.name.as_str(), quantity.as_str(), price.as_str()]),
        )?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(expense: &ScannedExpense) -> String {
    let mut output = String::new();

    output.push_str(&format!("Merchant: {}\n", expense.merchant));
    output.push_str(&format!("Date: {}\n", expense.date));
    output.push_str(&format!("Category: {}\n", expense.category));
    output.push_str(&format!("Amount: {}\n", expense.amount));
    if !expense.description.is_empty() {
        output.push_str(&format!("Description: {}\n", expense.description));
    }

    if !expense.items.is_empty() {
        output.push_str("\nItems:\n");
        for item in &expense.items {
            output.push_str(&format!("  {} x{} @ {}\n", item.name, item.quantity, item.price));
        }
        output.push_str(&format!("  Items total: {}\n", expense.items_total()));
    }

    output.push_str(&format!("\nID: {}\n", expense.id));
    output
}
