use anyhow::{anyhow, Context, Result};
use cleye_stream::testing::SyntheticBackend;
use cleye_stream::{
    available_cameras, CaptureEngine, CleyeConfig, ColorMode, FrameSource, ParameterValue,
    Resolution,
};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Only the synthetic driver is linked into this binary; a hardware build
// swaps in its own DeviceBackend.
fn backend() -> Arc<SyntheticBackend> {
    Arc::new(SyntheticBackend::new())
}

fn main() -> Result<()> {
    cleye_stream::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: cleye-cli <list-devices|capture|show-config> [args]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "list-devices" => cmd_list_devices(&args),
        "capture" => cmd_capture(&args),
        "show-config" => cmd_show_config(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn cmd_list_devices(args: &[String]) -> Result<()> {
    let backend = backend();
    let cameras = available_cameras(&*backend);
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&cameras)?);
    } else {
        for (index, guid) in cameras.iter().enumerate() {
            println!("{}: {}", index, guid);
        }
    }
    Ok(())
}

/// Effective configuration: file (if given) overridden by flags.
fn load_config(args: &[String]) -> Result<CleyeConfig> {
    let mut config = match flag_value(args, "--config") {
        Some(path) => CleyeConfig::load_from_file(path)?,
        None => CleyeConfig::default(),
    };

    if let Some(mode) = flag_value(args, "--mode") {
        config.camera.capture.color_mode =
            ColorMode::parse(mode).ok_or_else(|| anyhow!("Invalid color mode: {}", mode))?;
    }
    if let Some(resolution) = flag_value(args, "--resolution") {
        config.camera.capture.resolution = Resolution::parse(resolution)
            .ok_or_else(|| anyhow!("Invalid resolution: {}", resolution))?;
    }
    if let Some(fps) = flag_value(args, "--fps") {
        config.camera.capture.frame_rate = fps.parse().context("--fps expects a number")?;
    }
    if let Some(index) = flag_value(args, "--index") {
        config.camera.identity.camera_index = index.parse().context("--index expects an integer")?;
    }

    config.validate().map_err(|e| anyhow!(e))?;
    Ok(config)
}

fn cmd_capture(args: &[String]) -> Result<()> {
    // capture [--config <path>] [--mode <m>] [--resolution <r>] [--fps <f>]
    //         [--index <n>] [--frames <n>] [--set name=value]... [--json]
    let config = load_config(args)?;
    let frames: u64 = match flag_value(args, "--frames") {
        Some(n) => n.parse().context("--frames expects an integer")?,
        None => 10,
    };
    let json = args.contains(&"--json".to_string());

    let engine = CaptureEngine::from_config(backend(), &config)?;
    for setting in flag_values(args, "--set") {
        let (name, value) = setting
            .split_once('=')
            .ok_or_else(|| anyhow!("--set expects name=value, got {}", setting))?;
        let value = ParameterValue::parse(name, value)
            .ok_or_else(|| anyhow!("Invalid parameter: {}", setting))?;
        engine.set_parameter(value);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let source = FrameSource::new(engine);
    let mut subscription = source.subscribe()?;

    let mut received = 0;
    while received < frames && !interrupted.load(Ordering::SeqCst) {
        let Some(frame) = subscription.blocking_recv() else {
            eprintln!("Capture session ended");
            break;
        };
        received += 1;
        if json {
            let summary = serde_json::json!({
                "sequence": frame.sequence,
                "timestamp_us": frame.timestamp_us,
                "width": frame.width,
                "height": frame.height,
                "format": frame.format,
                "bytes": frame.data.len(),
            });
            println!("{}", summary);
        } else {
            println!(
                "Frame: {}x{} {:?} seq:{}",
                frame.width, frame.height, frame.format, frame.sequence
            );
        }
    }

    let stats = source.engine().stats();
    drop(subscription);
    if !json {
        println!(
            "Captured {} frames ({} pulled, {} emitted, {} pull timeouts)",
            received, stats.frames_pulled, stats.frames_emitted, stats.pull_timeouts
        );
    }
    Ok(())
}

fn cmd_show_config(args: &[String]) -> Result<()> {
    let config = load_config(args)?;
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn flag_values<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
    args.windows(2)
        .filter(|pair| pair[0] == flag)
        .map(|pair| pair[1].as_str())
        .collect()
}
