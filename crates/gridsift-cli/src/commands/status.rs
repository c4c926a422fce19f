//! Status command implementation

use gridsift_core::graph::{FalkorValue, GraphSchema};

pub async fn run(show_builds: bool, db_uri: Option<&str>, graph_name: &str) -> anyhow::Result<()> {
    let schema = GraphSchema::connect(db_uri, graph_name).await?;

    // Get statistics
    let stats = schema.stats().await?;
    println!("Index Status for graph '{}'", graph_name);
    println!("================================\n");
    println!("{}", stats);

    // Show builds if requested
    if show_builds {
        println!("\n--- Indexed Builds ---\n");

        let results = schema
            .query(
                r#"
                MATCH (s:BuildStatus)
                RETURN s.job, s.build_id, s.result, s.finished_at
                ORDER BY s.job, s.finished_at
                "#,
            )
            .await?;

        if results.is_empty() {
            println!("No builds indexed.");
        } else {
            println!("{:<40} {:<24} {:<10} {:<12}", "JOB", "BUILD", "RESULT", "FINISHED");
            println!("{}", "-".repeat(88));

            for row in &results {
                let job = extract_string(&row.first());
                let build_id = extract_string(&row.get(1));
                let result = extract_string(&row.get(2));
                let finished = extract_i64(&row.get(3));

                println!(
                    "{:<40} {:<24} {:<10} {:<12}",
                    truncate(&job, 40),
                    truncate(&build_id, 24),
                    result,
                    finished
                );
            }

            println!("\nTotal: {} builds", results.len());
        }
    }

    // Show the most common failure signatures
    println!("\n--- Top Failure Signatures ---\n");

    let results = schema
        .query(
            r#"
            MATCH (t:TestResult)
            WHERE t.signature_hash <> '' AND t.status IN [2, 3, 4]
            RETURN t.signature_hash, count(t), collect(DISTINCT t.test)[0]
            ORDER BY count(t) DESC
            LIMIT 10
            "#,
        )
        .await?;

    if results.is_empty() {
        println!("  (none)");
    }
    for row in &results {
        let hash = extract_string(&row.first());
        let count = extract_i64(&row.get(1));
        let test = extract_string(&row.get(2));
        println!("  {:<12} {:>6}  {}", truncate(&hash, 12), count, truncate(&test, 70));
    }

    Ok(())
}

fn extract_string(val: &Option<&FalkorValue>) -> String {
    val.and_then(|v| match v {
        FalkorValue::String(s) => Some(s.clone()),
        _ => None,
    })
    .unwrap_or_default()
}

fn extract_i64(val: &Option<&FalkorValue>) -> i64 {
    val.and_then(|v| match v {
        FalkorValue::I64(n) => Some(*n),
        _ => None,
    })
    .unwrap_or(0)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
