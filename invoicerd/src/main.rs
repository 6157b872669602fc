//! Invoice node HTTP entrypoint.
//!
//! Endpoints (all `POST` with a JSON body unless noted):
//! - `GET /` – node id, network and available commands
//! - `/invoice` – create an invoice and its BOLT11 payment request
//! - `/listinvoices` – one invoice by label, or all
//! - `/delinvoice`, `/delexpiredinvoice` – remove invoices
//! - `/waitinvoice`, `/waitanyinvoice` – block until an invoice is paid
//! - `/decodepay` – decode a BOLT11 payment request
//! - `/htlc` – settle an HTLC offered by the channel layer
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` points at the JSON config file (default `config.json`)
//! - `HOST`, `PORT` control the binding address when the config omits them
//! - `RUST_LOG` filters logs; `OTEL_*` enables export with the `telemetry` feature

mod config;
mod run;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        println!("{e}");
        process::exit(1)
    }
}
