//! CLI `doctor` command: report model artifacts, device, and credentials.

use aiary::caption::resolve_api_key;
use aiary::config::AiaryConfig;
use aiary::runtime::onnx::{missing_artifacts, select_device, REQUIRED_FILES};
use anyhow::Result;

pub fn doctor(config: &AiaryConfig) -> Result<()> {
    let model_dir = config.resolved_model_dir();

    println!("Aiary Health Report");
    println!("===================");
    println!();
    println!("Model directory:   {}", model_dir.display());
    if !model_dir.is_dir() {
        println!("  Status:          NOT FOUND");
        println!("  Copy the exported model there or set AIARY_MODEL_DIR.");
    } else {
        let missing = missing_artifacts(&model_dir);
        for name in REQUIRED_FILES {
            let state = if missing.contains(&name) { "missing" } else { "ok" };
            println!("  {name:<22} {state}");
        }
    }
    println!("Device:            {}", select_device(config.model.prefer_accelerator));
    println!("Worker slots:      {}", config.worker.max_concurrent_jobs.max(1));
    println!();
    println!("Vision service:");
    println!("  Endpoint:        {}", config.vision.base_url);
    println!("  Model:           {}", config.vision.model);
    match resolve_api_key(&config.vision.api_key_env) {
        Ok(_) => println!("  Credential:      ${} set", config.vision.api_key_env),
        Err(_) => println!("  Credential:      ${} NOT SET", config.vision.api_key_env),
    }

    Ok(())
}
