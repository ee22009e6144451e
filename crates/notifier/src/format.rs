use reqwest::Url;
use txwatch_domain::{Network, StartupSummary, Transaction};

const ADDRESS_EDGE: usize = 8;
const HASH_EDGE: usize = 12;
const SHORTEN_ABOVE: usize = 16;

/// Full alert for one large transaction.
pub fn transaction_message(tx: &Transaction) -> String {
    let network = tx.network();
    let time = tx
        .occurred_at()
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let link = explorer_link(network, tx.tx_hash());

    format!(
        "🚨 <b>Large Transaction Detected!</b>\n\
         \n\
         💰 <b>Amount:</b> ${usd}\n\
         \u{20}\u{20}\u{20}({native} {symbol})\n\
         \n\
         🌐 <b>Network:</b> {network}\n\
         \n\
         📤 <b>From:</b> <code>{from}</code>\n\
         📥 <b>To:</b> <code>{to}</code>\n\
         \n\
         🔗 <b>Transaction:</b> <code>{hash}</code>\n\
         \n\
         🕒 <b>Time:</b> {time}\n\
         \n\
         🔍 <a href=\"{link}\">View on Explorer</a>",
        usd = group_thousands(tx.amount_usd(), 2),
        native = group_thousands(tx.amount_native(), 4),
        symbol = network.token_symbol(),
        network = network,
        from = escape_html(&shorten(tx.sender(), ADDRESS_EDGE)),
        to = escape_html(&shorten(tx.receiver(), ADDRESS_EDGE)),
        hash = escape_html(&shorten(tx.tx_hash(), HASH_EDGE)),
        time = time,
        link = escape_html(&link),
    )
}

/// Health notice; the leading warning marker keeps it apart from alerts.
pub fn error_message(message: &str) -> String {
    format!("⚠️ <b>Error:</b> {}", escape_html(message))
}

pub fn recovery_message(network: Network) -> String {
    format!("✅ <b>Recovered:</b> {network} is polling normally again")
}

pub fn startup_message(summary: &StartupSummary) -> String {
    let networks = summary
        .networks
        .iter()
        .map(|network| network.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "🤖 <b>Transaction Monitor Started</b>\n\
         \n\
         Monitoring networks: {networks}\n\
         Alert threshold: ${threshold}\n\
         Poll interval: {interval}s\n\
         \n\
         ✅ Monitoring is active",
        networks = escape_html(&networks),
        threshold = group_thousands(summary.min_usd, 0),
        interval = summary.poll_interval.as_secs(),
    )
}

/// Appends `hash` as one path segment; base64 hashes may contain `/`.
pub fn explorer_link(network: Network, hash: &str) -> String {
    let base = network.explorer_tx_url();
    let Ok(mut url) = Url::parse(base) else {
        return format!("{base}{hash}");
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(hash);
    }
    url.to_string()
}

/// Keeps the first and last `edge` characters of long identifiers.
pub fn shorten(value: &str, edge: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= SHORTEN_ABOVE.max(edge * 2) {
        return value.to_string();
    }
    let head: String = chars[..edge].iter().collect();
    let tail: String = chars[chars.len() - edge..].iter().collect();
    format!("{head}...{tail}")
}

/// Formats `value` with `decimals` places and comma-grouped integer digits.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let rendered = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match rendered.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (rendered.as_str(), None),
    };

    let mut grouped = String::with_capacity(rendered.len() + int_part.len() / 3 + 1);
    if value.is_sign_negative() && value != 0.0 {
        grouped.push('-');
    }
    for (idx, digit) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(frac_part) = frac_part {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
