//! Load testing for route resolution under concurrent table swaps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use route_engine::routing::{RequestHeaders, RouteTableHandle};

mod common;

fn routes(cluster: &str) -> String {
    format!(
        r#"
        [[virtual_hosts]]
        name = "api"
        domains = ["api.example.com", "*.api.example.com"]

        [[virtual_hosts.routes]]
        prefix = "/health"
        cluster = "health"

        [[virtual_hosts.routes]]
        prefix = "/"
        cluster = "{cluster}"
        retry_policy = {{ retry_on = "5xx", num_retries = 2 }}
        "#
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resolution_during_hot_swaps() {
    let handle = Arc::new(RouteTableHandle::new(common::table_from_toml(&routes("blue"))));
    let stop = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for worker in 0..8u64 {
        let handle = handle.clone();
        let stop = stop.clone();
        readers.push(tokio::spawn(async move {
            let mut resolved = 0u64;
            let host = format!("shard{worker}.api.example.com");
            while !stop.load(Ordering::Relaxed) {
                let request = RequestHeaders::get(host.clone(), "/users");
                let route = handle.route(&request, resolved).expect("route must always resolve");
                let cluster = route.route_entry().unwrap().cluster_name().to_string();
                assert!(cluster == "blue" || cluster == "green", "unexpected cluster {cluster}");
                resolved += 1;
                if resolved % 256 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            resolved
        }));
    }

    let blue = routes("blue");
    let green = routes("green");
    for i in 0..50 {
        let next = if i % 2 == 0 { &green } else { &blue };
        handle.publish(common::table_from_toml(next));
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    stop.store(true, Ordering::Relaxed);

    let mut total = 0;
    for reader in readers {
        total += reader.await.unwrap();
    }
    assert!(total > 0);
}

#[tokio::test]
async fn test_snapshot_outlives_publish() {
    let handle = RouteTableHandle::new(common::table_from_toml(&routes("blue")));
    let snapshot = handle.load();

    handle.publish(common::table_from_toml(&routes("green")));

    let request = RequestHeaders::get("api.example.com", "/");
    let old = snapshot.route(&request, 0).unwrap();
    let new = handle.route(&request, 0).unwrap();
    assert_eq!(old.route_entry().unwrap().cluster_name(), "blue");
    assert_eq!(new.route_entry().unwrap().cluster_name(), "green");
}

#[tokio::test]
async fn test_resolution_throughput() {
    let handle = RouteTableHandle::new(common::table_from_toml(&routes("blue")));
    let requests = 50_000u64;

    let start = Instant::now();
    for seed in 0..requests {
        let request = RequestHeaders::get("api.example.com", "/users/42");
        assert!(handle.route(&request, seed).is_some());
    }
    let elapsed = start.elapsed();

    println!("Load Test Results:");
    println!("  Total Requests: {}", requests);
    println!("  Total Time:     {:?}", elapsed);
    println!("  Throughput:     {:.2} req/s", requests as f64 / elapsed.as_secs_f64());
}
