use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

// Global Prometheus registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn service_and_env() -> (String, String) {
    let service = std::env::var("APP_SERVICE").unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());
    let env_name = std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
    (service, env_name)
}

fn opts(name: &str, help: &str) -> Opts {
    let (service, env_name) = service_and_env();
    Opts::new(name, help)
        .const_label("service", service)
        .const_label("env", env_name)
}

// App info gauge (const)
pub static APP_INFO: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::with_opts(
        opts("app_info", "Application info gauge").const_label("version", env!("CARGO_PKG_VERSION")),
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

// Chat turns by mode (rag/assistant) and outcome (ok/error/rejected)
pub static CHAT_TURNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let cv = IntCounterVec::new(opts("chat_turns_total", "Chat turns by mode and outcome"), &["mode", "outcome"])
        .unwrap();
    REGISTRY.register(Box::new(cv.clone())).ok();
    cv
});

pub static ACTIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::with_opts(opts("active_sessions", "Chat sessions currently held in memory")).unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

// Index metrics
pub static INDEX_BUILDS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(opts("index_builds_total", "Successful retrieval index builds")).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static INDEX_BUILD_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(opts("index_build_failures_total", "Failed retrieval index builds")).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static INDEX_RECORDS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::with_opts(opts("index_records", "Chunks held by the retrieval index")).unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

/// Positive, sorted bucket bounds from a comma-separated env var; `None`
/// when unset, empty or malformed.
pub fn parse_buckets_env(var: &str) -> Option<Vec<f64>> {
    match std::env::var(var) {
        Ok(val) if !val.trim().is_empty() => {
            let mut parsed: Vec<f64> = Vec::new();
            for tok in val.split(',') {
                let t = tok.trim();
                if t.is_empty() {
                    continue;
                }
                match t.parse::<f64>() {
                    Ok(v) if v > 0.0 => parsed.push(v),
                    _ => {
                        tracing::warn!(env_var = %var, token = %t, "Invalid histogram bucket value; ignoring");
                        return None;
                    }
                }
            }
            if parsed.is_empty() {
                None
            } else {
                parsed.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                Some(parsed)
            }
        }
        _ => None,
    }
}

pub static RETRIEVAL_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let default = vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0];
    let buckets = parse_buckets_env("RETRIEVAL_HISTO_BUCKETS").unwrap_or(default);
    let mut opts = HistogramOpts::new("retrieval_latency_ms", "Query embedding + vector search latency in milliseconds")
        .buckets(buckets);
    opts.common_opts = opts.common_opts.const_label("service", service).const_label("env", env_name);
    let h = Histogram::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

// Hosted assistant
pub static ASSISTANT_POLLS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(opts("assistant_run_polls_total", "Run status polls against the hosted assistant")).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ASSISTANT_THREADS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(opts("assistant_threads_created_total", "Remote threads created")).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub fn observe_retrieval_latency_ms(duration_ms: f64) {
    RETRIEVAL_LATENCY_MS.observe(duration_ms);
}

pub fn record_turn(mode: &str, outcome: &str) {
    CHAT_TURNS_TOTAL.with_label_values(&[mode, outcome]).inc();
}

// Exporter for Prometheus text format
pub fn export_prometheus() -> String {
    Lazy::force(&APP_INFO).set(1);
    let metric_families = REGISTRY.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        "".to_string()
    }
}
