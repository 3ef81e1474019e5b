use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_histogram_vec, CounterVec, HistogramVec,
};

pub mod db {
    use super::*;
    use std::time::Duration;

    lazy_static! {
        static ref DB_QUERY_DURATION: HistogramVec = register_histogram_vec!(
            histogram_opts!(
                "db_query_duration_seconds",
                "Duration of database queries"
            ),
            &["backend", "svc", "api"]
        )
        .unwrap();
        static ref DB_QUERY_FAILURES: CounterVec = register_counter_vec!(
            opts!("db_query_failures_total", "Number of failed database queries"),
            &["backend", "svc", "api"]
        )
        .unwrap();
    }

    pub fn record_db_query(
        backend: &'static str,
        svc: &'static str,
        api: &'static str,
        duration: Duration,
        success: bool,
    ) {
        DB_QUERY_DURATION
            .with_label_values(&[backend, svc, api])
            .observe(duration.as_secs_f64());
        if !success {
            DB_QUERY_FAILURES
                .with_label_values(&[backend, svc, api])
                .inc();
        }
    }
}

pub mod grpc {
    use super::*;
    use std::time::Instant;
    use tracing::Span;

    lazy_static! {
        static ref GRPC_API_SUCCESS: CounterVec = register_counter_vec!(
            opts!("grpc_api_success_total", "Number of successful gRPC requests"),
            &["api"]
        )
        .unwrap();
        static ref GRPC_API_FAILURE: CounterVec = register_counter_vec!(
            opts!("grpc_api_failure_total", "Number of failed gRPC requests"),
            &["api", "error_kind"]
        )
        .unwrap();
        static ref GRPC_API_DURATION: HistogramVec = register_histogram_vec!(
            histogram_opts!(
                "grpc_api_duration_seconds",
                "Duration of gRPC requests"
            ),
            &["api"]
        )
        .unwrap();
    }

    /// Per-request recording: a span for the handler to run in, plus success
    /// and failure accounting. Construct through `recorded_grpc_request!`.
    pub struct RecordedGrpcRequest {
        pub span: Span,
        api: &'static str,
        start: Instant,
    }

    impl RecordedGrpcRequest {
        pub fn new(api: &'static str, span: Span) -> Self {
            Self {
                span,
                api,
                start: Instant::now(),
            }
        }

        pub fn succeed<T>(self, result: T) -> T {
            GRPC_API_SUCCESS.with_label_values(&[self.api]).inc();
            GRPC_API_DURATION
                .with_label_values(&[self.api])
                .observe(self.start.elapsed().as_secs_f64());
            let _enter = self.span.enter();
            tracing::debug!("gRPC request succeeded");
            result
        }

        pub fn fail<T>(self, result: T, error_kind: &str) -> T {
            GRPC_API_FAILURE
                .with_label_values(&[self.api, error_kind])
                .inc();
            GRPC_API_DURATION
                .with_label_values(&[self.api])
                .observe(self.start.elapsed().as_secs_f64());
            let _enter = self.span.enter();
            tracing::error!(error_kind, "gRPC request failed");
            result
        }
    }
}

#[macro_export]
macro_rules! recorded_grpc_request {
    ($api:expr $(, $($tail:tt)*)?) => {
        $crate::metrics::grpc::RecordedGrpcRequest::new(
            $api,
            tracing::info_span!("grpc_api_request", api = $api $(, $($tail)*)?),
        )
    };
}
