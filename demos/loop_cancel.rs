//! Render the orbit loop to GIF, then show a render cancelled mid-loop.
//!
//! Run with: cargo run --example loop_cancel

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use wasm_sketch_sandbox_rs::prelude::*;
use wasm_sketch_sandbox_rs::{GifFrameEncoder, RenderProgress};

const SOURCE: &str = include_str!("../sketches/orbit.wat");

#[tokio::main]
async fn main() -> Result<()> {
    let config = SandboxConfig::builder().fps(24).duration_range(1.0, 3.0).build();
    let sandbox = SketchSandbox::new(config)?;
    let request = ExecutionRequest::new_loop(SOURCE, 256, 256, 48).with_vars([40.0]);

    println!("=== Full loop ===");
    let options = ExecuteOptions::default()
        .with_encoder(Arc::new(GifFrameEncoder))
        .with_progress(Arc::new(|progress: &RenderProgress| {
            println!("{:>6.1}% {}", progress.percent, progress.message);
        }));
    let result = execute(&sandbox, &request, options).await?;
    if let RenderOutput::Encoded { bytes, content_type, frame_count } = &result.output {
        std::fs::write("orbit.gif", bytes)?;
        println!("wrote {frame_count} frames as {content_type}");
    }

    println!("\n=== Cancelled after 10 frames ===");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let options = ExecuteOptions::default()
        .with_cancel(cancel)
        .with_progress(Arc::new(move |progress: &RenderProgress| {
            if progress.frame == Some(9) {
                trigger.cancel();
            }
        }));
    match execute(&sandbox, &request, options).await {
        Err(SketchError::Cancelled { frame }) => println!("cancelled before frame {frame}; no output"),
        Ok(_) => println!("render finished before cancellation"),
        Err(e) => return Err(e),
    }

    Ok(())
}
