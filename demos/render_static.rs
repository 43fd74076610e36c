//! Render the flow-field sketch to PNG and write its snapshot.
//!
//! Run with: cargo run --example render_static

use std::time::Duration;

use wasm_sketch_sandbox_rs::prelude::*;
use wasm_sketch_sandbox_rs::protocol::runtime_identity_hash;
use wasm_sketch_sandbox_rs::snapshot::hash_output;

const SOURCE: &str = include_str!("../sketches/flow_field.wat");

#[tokio::main]
async fn main() -> Result<()> {
    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(5))
        .max_memory(32 * 1024 * 1024)
        .build();
    let sandbox = SketchSandbox::new(config)?;

    let request = ExecutionRequest::new_static(SOURCE, 512, 512)
        .with_seed(2024)
        .with_vars([35.0, 60.0]);

    let result = execute(
        &sandbox,
        &request,
        ExecuteOptions::default().with_output(OutputFormat::Png),
    )
    .await?;

    let RenderOutput::Png(png) = &result.output else {
        unreachable!("PNG output was requested");
    };
    std::fs::write("flow_field.png", png)?;

    let validated = request.validate(sandbox.config())?;
    let snapshot = Snapshot::create(&validated, runtime_identity_hash(), hash_output(png), true);
    snapshot.save("flow_field.png.snapshot.json")?;

    println!("metadata: {}", serde_json::to_string_pretty(&result.metadata)?);
    println!("outputHash: {}", snapshot.output_hash);
    Ok(())
}
