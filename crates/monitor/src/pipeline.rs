use metrics::counter;
use tracing::{debug, trace};

use txwatch_domain::{DuplicateWindow, Network, RawTransfer, Transaction};

/// Prices a fetched batch and keeps the transfers worth alerting on.
///
/// Records are handled in provider order. A record is emitted only when its
/// USD value reaches `min_usd` and its hash is not already in `window`; the
/// hash is recorded before the next record is checked, so a hash repeated
/// inside one batch is emitted once. Filtered records never touch `window`.
pub fn filter_batch(
    network: Network,
    batch: Vec<RawTransfer>,
    price_usd: f64,
    min_usd: f64,
    window: &mut DuplicateWindow,
) -> Vec<Transaction> {
    let mut emitted = Vec::new();

    for raw in batch {
        let tx = match Transaction::priced(network, raw, price_usd) {
            Ok(tx) => tx,
            Err(err) => {
                debug!(%network, error = %err, "skipping malformed transfer");
                filtered(network, "invalid");
                continue;
            }
        };

        if tx.amount_usd() < min_usd {
            trace!(
                %network,
                hash = tx.tx_hash(),
                amount_usd = tx.amount_usd(),
                min_usd,
                "below threshold"
            );
            filtered(network, "below_threshold");
            continue;
        }

        if window.is_duplicate(tx.tx_hash()) {
            filtered(network, "duplicate");
            continue;
        }

        window.record(tx.tx_hash());
        emitted.push(tx);
    }

    if !emitted.is_empty() {
        counter!("txwatch_transactions_emitted_total", "network" => network.label())
            .increment(emitted.len() as u64);
    }
    emitted
}

fn filtered(network: Network, reason: &'static str) {
    counter!(
        "txwatch_transactions_filtered_total",
        "network" => network.label(),
        "reason" => reason
    )
    .increment(1);
}
