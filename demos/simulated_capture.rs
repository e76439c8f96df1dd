//! Drive the platform lifecycle against the simulated camera and print what
//! the localizer would receive.
//!
//! Usage: RUST_LOG=info cargo run --example simulated_capture
//! Honors the ML2_* environment variables read by `CaptureConfig::from_env`.

use ml2_capture::{
    CameraPlatform, CaptureConfig, PlatformSupport, PoseSnapshot, SharedTransform,
    SimulatedCamera,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = CaptureConfig::from_env();
    println!(
        "Target {}x{}  poll={:?}  settle={:?}  timeout={:?}",
        config.target_resolution.0,
        config.target_resolution.1,
        config.poll_interval,
        config.settle_delay,
        config.configure_timeout
    );

    let camera = Arc::new(
        SimulatedCamera::builder()
            .unavailable_polls(2)
            .frame_interval(Duration::from_millis(33))
            .build(),
    );
    let transform = Arc::new(SharedTransform::default());
    let platform = CameraPlatform::new(camera, transform.clone(), config);

    match platform.configure_platform().await {
        Ok(result) if result.success => println!("Camera configured"),
        Ok(_) => {
            eprintln!("Camera not ready");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Configuration failed: {}", e);
            std::process::exit(1);
        }
    }

    let start = Instant::now();
    let mut delivered = 0u32;
    for step in 0..30 {
        // Stand-in for the engine moving the head.
        transform.set(PoseSnapshot {
            position: [step as f32 * 0.01, 1.6, 0.0],
            ..PoseSnapshot::IDENTITY
        });

        match platform.update_platform().await {
            Ok(update) => match update.camera_data {
                Some(mut data) => {
                    delivered += 1;
                    if step % 10 == 0 {
                        println!(
                            "frame #{:<5} {}x{}  pos=[{:+.3}, {:+.3}, {:+.3}]  K=[{:.1}, {:.1}, {:.1}, {:.1}]",
                            data.sequence,
                            data.width,
                            data.height,
                            data.pose.position[0],
                            data.pose.position[1],
                            data.pose.position[2],
                            data.intrinsics[0],
                            data.intrinsics[1],
                            data.intrinsics[2],
                            data.intrinsics[3],
                        );
                    }
                    data.dispose();
                }
                None => println!("no frame yet (tracking={})", update.status.tracking_quality),
            },
            Err(e) => {
                eprintln!("Update failed: {}", e);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(33)).await;
    }

    platform.stop_and_clean_up().await;
    println!(
        "\nDelivered {} frames in {:.1}s, state {:?}",
        delivered,
        start.elapsed().as_secs_f64(),
        platform.connection_state()
    );
}
