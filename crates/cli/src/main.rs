//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `modelpack-key-expiry`: logs one line per trusted key with its
//! fingerprint, days remaining until expiry, and an action label, then
//! exits 0 if none are expired or within the warning window, 1 otherwise.

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use modelpack_core::trust::{self, KeyHome, TrustContext, TrustedKeysDir};

const DEFAULT_DAYS_BEFORE_WARNING: i64 = 30;

#[derive(Parser, Debug)]
#[command(author, version, about = "Log info about when trusted model-signing keys will expire", long_about = None)]
struct Cli {
    /// Warn about keys expiring within this many days.
    #[arg(value_name = "DAYS_BEFORE_WARNING")]
    days_before_warning: Option<i64>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let days_before_warning = cli.days_before_warning.unwrap_or(DEFAULT_DAYS_BEFORE_WARNING);

    match run(days_before_warning) {
        Ok(no_keys_close_to_expiry) => {
            if no_keys_close_to_expiry {
                process::exit(0);
            }
            process::exit(1);
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to check key expiry");
            eprintln!("error: {err:#}");
            process::exit(2);
        }
    }
}

fn run(days_before_warning: i64) -> Result<bool> {
    let ctx = TrustContext::from_env().context("reading UNSAFE_GPG_TESTING_ENABLED")?;
    let trusted_dir = std::env::var_os("SERIALIZATION_TRUSTED_KEYS_DIR")
        .context("SERIALIZATION_TRUSTED_KEYS_DIR must be set")?;
    let trusted = TrustedKeysDir::open(trusted_dir).context("opening trusted keys directory")?;
    let key_home = KeyHome::seed(&ctx, &trusted).context("seeding key home from trusted keys")?;

    let mut no_keys_close_to_expiry = true;
    for cert in key_home.certs() {
        let fingerprint = cert.fingerprint().to_hex();
        let days_to_expiry = trust::days_until_expiry(cert);

        let action = match days_to_expiry {
            None => "ok for now, but stay tuned (never expires)",
            Some(days) if days < 0 => {
                no_keys_close_to_expiry = false;
                "KEY IS EXPIRED!"
            }
            Some(days) if days < days_before_warning => {
                no_keys_close_to_expiry = false;
                "UPDATE KEY ASAP!!!!"
            }
            Some(_) => "ok for now, but stay tuned",
        };

        match days_to_expiry {
            None => tracing::info!(fingerprint, days_to_expiry = "never", action, "key expiry"),
            Some(days) => tracing::info!(fingerprint, days_to_expiry = days, action, "key expiry"),
        }
    }

    Ok(no_keys_close_to_expiry)
}
