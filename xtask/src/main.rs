use hdrhistogram::Histogram;
use rand::{seq::SliceRandom, thread_rng};
use reqwest::Client;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:8080/v1/blog".to_string());
    let clients: usize = std::env::args().nth(2).and_then(|s| s.parse().ok()).unwrap_or(4);
    let total: usize = std::env::args().nth(3).and_then(|s| s.parse().ok()).unwrap_or(40);
    let topics = vec![
        "climate change",
        "rust ownership",
        "remote work",
        "quantum computing",
        "home gardening",
        "sleep science",
    ];
    let audiences = vec![
        "Researchers",
        "Data Scientist",
        "Common People",
        "Business Professionals",
    ];

    let client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(600))
        .build()?;
    let mut hist = Histogram::<u64>::new(3)?;
    let mut errors = 0usize;

    let start = Instant::now();
    let mut tasks = vec![];
    for _ in 0..clients {
        let client = client.clone();
        let url = url.clone();
        let topics = topics.clone();
        let audiences = audiences.clone();
        tasks.push(tokio::spawn(async move {
            let mut latencies = vec![];
            let mut errs = 0;
            for _ in 0..(total / clients) {
                let body = {
                    let mut rng = thread_rng();
                    serde_json::json!({
                        "topic": topics.choose(&mut rng).copied().unwrap_or("rust"),
                        "word_count": [100, 200, 300].choose(&mut rng).copied().unwrap_or(200),
                        "audience": audiences.choose(&mut rng).copied().unwrap_or("Researchers"),
                    })
                };
                let t0 = Instant::now();
                let res = client.post(&url).json(&body).send().await;
                let dur = t0.elapsed();
                match res {
                    Ok(r) if r.status().is_success() => latencies.push(dur),
                    _ => errs += 1,
                }
            }
            (latencies, errs)
        }));
    }

    for t in tasks {
        let (ls, e) = t.await?;
        for d in ls {
            hist.record(d.as_millis() as u64).ok();
        }
        errors += e;
    }

    println!("ran {} reqs in {:?}", total, start.elapsed());
    println!("errors: {}", errors);
    println!("p50: {} ms", hist.value_at_quantile(0.50));
    println!("p95: {} ms", hist.value_at_quantile(0.95));
    println!("p99: {} ms", hist.value_at_quantile(0.99));
    Ok(())
}
