// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Voucherwerk — files vouchers and merges their supporting documents.
//
// Entry point. Initialises logging, parses the command line, and hands off to
// the command handlers.

mod commands;
mod data_dir;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "voucherwerk")]
#[command(version)]
#[command(about = "Match supporting documents to vouchers and merge them into one PDF", long_about = None)]
struct Cli {
    /// SQLite object store (defaults to the user data directory)
    #[arg(long, global = true, env = "VOUCHERWERK_STORE", value_name = "FILE")]
    store: Option<PathBuf>,

    /// JSON configuration file; unset keys keep their defaults
    #[arg(long, global = true, env = "VOUCHERWERK_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// OCR fields shared by vouchers and attachments.
#[derive(Args, Debug, Clone, Default)]
pub struct OcrFields {
    /// Gold weight, e.g. "20,000.50"
    #[arg(long)]
    weight: Option<String>,

    /// Purity, e.g. "22K" or "0.916"
    #[arg(long)]
    purity: Option<String>,

    /// Document date, e.g. "02/06/2025"
    #[arg(long)]
    date: Option<String>,

    /// Invoice amount in USD
    #[arg(long)]
    usd: Option<String>,

    /// Invoice amount in AED
    #[arg(long)]
    aed: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a PDF with one page per JPEG/PNG image
    BuildPdf {
        /// Images, in page order
        #[arg(value_name = "IMAGE", required = true)]
        images: Vec<PathBuf>,

        /// Output PDF
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Describe the page images of an engine-written PDF
    Extract {
        #[arg(value_name = "PDF")]
        input: PathBuf,

        /// Write each page payload into this directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Print the page count of an engine-written PDF
    PageCount {
        #[arg(value_name = "PDF")]
        input: PathBuf,
    },

    /// Reduce a PDF to its first page (unparseable files are copied as-is)
    FirstPage {
        #[arg(value_name = "PDF")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// File a voucher scan in the store
    Register {
        /// Voucher scan (JPEG, PNG, or PDF)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Document number, e.g. MPU01-85285
        #[arg(long)]
        document_no: String,

        /// Voucher code (MPU, MPV, MRT, MSL, REC, PAY, MJV)
        #[arg(long)]
        classification: String,

        #[arg(long)]
        branch: Option<String>,

        #[arg(long)]
        discount_rate: Option<String>,

        #[command(flatten)]
        fields: OcrFields,
    },

    /// Route a supporting document to its vouchers
    Attach {
        /// Attachment scan (JPEG, PNG, or PDF)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(long, default_value = "")]
        document_no: String,

        /// Attachment code assigned by the classifier, e.g. FHE
        #[arg(long)]
        classification: String,

        /// Retry transient merge failures this many times
        #[arg(long, default_value = "0")]
        retries: u32,

        #[command(flatten)]
        fields: OcrFields,
    },

    /// Re-route every parked attachment
    RetryPending,

    /// List stored vouchers
    Vouchers,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = cli.store.unwrap_or_else(data_dir::default_store_path);
    let config = cli.config;

    let result = match cli.command {
        Commands::BuildPdf { images, output } => commands::build_pdf(&images, &output),
        Commands::Extract { input, output } => commands::extract(&input, output.as_deref()),
        Commands::PageCount { input } => commands::page_count(&input),
        Commands::FirstPage { input, output } => commands::first_page(&input, &output),
        Commands::Register {
            input,
            document_no,
            classification,
            branch,
            discount_rate,
            fields,
        } => commands::open(&store, config.as_deref()).and_then(|orch| {
            let record =
                commands::voucher_record(document_no, classification, branch, discount_rate, fields);
            commands::register(&orch, record, &input)
        }),
        Commands::Attach {
            input,
            document_no,
            classification,
            retries,
            fields,
        } => commands::open(&store, config.as_deref()).and_then(|orch| {
            commands::attach(&orch, &input, document_no, classification, fields, retries)
        }),
        Commands::RetryPending => {
            commands::open(&store, config.as_deref()).and_then(|orch| commands::retry_pending(&orch))
        }
        Commands::Vouchers => {
            commands::open(&store, config.as_deref()).and_then(|orch| commands::vouchers(&orch))
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
