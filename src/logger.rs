use std::time::Duration;

use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "runtime_gateway=info";

pub fn init() {

    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

}

pub fn log_completion(
    model: &str,
    prompt_tokens: u64,
    completion_tokens: u64,
    elapsed: Duration,
) {

    info!(
        model,
        prompt_tokens,
        completion_tokens,
        total_tokens = prompt_tokens + completion_tokens,
        elapsed_ms = elapsed.as_millis() as u64,
        "completion served"
    );

}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_default_filter_only_names_this_crate() {

        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        for directive in DEFAULT_FILTER.split(',') {
            assert!(directive.starts_with("runtime_gateway"), "unexpected directive {}", directive);
        }

    }

}
