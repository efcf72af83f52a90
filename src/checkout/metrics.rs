// Checkout counters and timings, emitted as trace events on the
// `checkout_metrics` target until a metrics backend is wired in.

#[macro_export]
macro_rules! checkout_counter_inc {
    ($name:expr $(, $key:expr => $val:expr )* $(,)?) => {{
        let labels: Vec<String> = vec![$( format!("{}={}", $key, $val) ),*];
        tracing::trace!(target: "checkout_metrics", counter = $name, labels = ?labels, "inc");
    }};
}

#[macro_export]
macro_rules! checkout_histogram_observe_ms {
    ($name:expr, $ms:expr $(, $key:expr => $val:expr )* $(,)?) => {{
        let labels: Vec<String> = vec![$( format!("{}={}", $key, $val) ),*];
        tracing::trace!(target: "checkout_metrics", histogram = $name, ms = $ms, labels = ?labels, "observe");
    }};
}
