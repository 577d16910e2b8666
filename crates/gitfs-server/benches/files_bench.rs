use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use gitfs_git::{FileSource, RefreshReport, Resolution, ResolvedFile};
use gitfs_server::{AppState, create_router};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::runtime::Runtime;
use tower::ServiceExt;

/// Serves the same content for every path.
struct FixedSource {
    content: Vec<u8>,
}

#[async_trait]
impl FileSource for FixedSource {
    async fn resolve(&self, env: &str, path: &str) -> Resolution {
        Resolution {
            file: Some(ResolvedFile {
                remote: "https://git.example.com/states.git@/var/cache/gitfs".to_string(),
                ref_name: env.to_string(),
                commit: "f".repeat(40),
                path: path.to_string(),
                content: self.content.clone(),
                ambiguity: None,
            }),
            failures: Vec::new(),
        }
    }

    async fn envs(&self) -> Vec<String> {
        vec!["base".to_string()]
    }

    async fn refresh(&self) -> RefreshReport {
        RefreshReport::default()
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Benchmark: GET /files through the full middleware stack
fn bench_get_file(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("get_file");

    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let source = Arc::new(FixedSource {
            content: vec![b'x'; size],
        });
        let prometheus = PrometheusBuilder::new().build_recorder().handle();
        let app = create_router(AppState::new(source), prometheus);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let request = Request::builder()
                    .uri("/files/base/nginx/init.sls")
                    .body(Body::empty())
                    .unwrap();
                let response = app.clone().oneshot(request).await.unwrap();
                std::hint::black_box(response)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_get_file);
criterion_main!(benches);
