mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use aiary::error::DiaryError;
use aiary::runtime::decoding::decode_sequence;
use aiary::runtime::executor::{build_prompt, InferenceExecutor};
use aiary::runtime::ModelRuntime;
use helpers::{seeded_config, CountingLoader, MissingModelLoader, EOS};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

#[test]
fn concurrent_first_use_loads_exactly_once() {
    let loader = CountingLoader::new();
    let runtime = Arc::new(ModelRuntime::new(loader.clone()));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                runtime.ensure_loaded().unwrap()
            })
        })
        .collect();
    let loaded: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(loader.load_count(), 1);
    assert!(runtime.is_loaded());
    for handle in &loaded[1..] {
        assert!(Arc::ptr_eq(&loaded[0], handle), "every caller shares one handle");
    }
}

#[test]
fn later_calls_reuse_the_handle() {
    let loader = CountingLoader::new();
    let runtime = ModelRuntime::new(loader.clone());
    assert!(!runtime.is_loaded());

    let first = runtime.ensure_loaded().unwrap();
    let second = runtime.ensure_loaded().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loader.load_count(), 1);
}

#[test]
fn missing_model_propagates_and_is_not_cached() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let runtime = ModelRuntime::new(MissingModelLoader {
        attempts: Arc::clone(&attempts),
    });

    for _ in 0..2 {
        let err = runtime.ensure_loaded().unwrap_err();
        assert!(matches!(err, DiaryError::ModelNotFound(_)));
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(!runtime.is_loaded());

    let executor = InferenceExecutor::new(Arc::new(runtime), seeded_config());
    assert!(matches!(
        executor.generate_narrative("1. 아기가 웃었다"),
        Err(DiaryError::ModelNotFound(_))
    ));
}

#[test]
fn generated_length_stays_within_bounds() {
    let loader = CountingLoader::new();
    let runtime = ModelRuntime::new(loader);
    let handle = runtime.ensure_loaded().unwrap();
    let config = seeded_config();

    let encoded = handle.codec.encode(&build_prompt("1. 아기가 웃었다")).unwrap();
    assert_eq!(encoded.input_ids.len(), 256);
    let encoder_output = handle.model.encode(&encoded).unwrap();

    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(seed);
        let ids = decode_sequence(
            &handle.special,
            &config,
            &mut rng,
            &CancellationToken::new(),
            |decoder_ids| handle.model.next_token_logits(&encoder_output, decoder_ids),
        )
        .unwrap();
        assert!(
            (config.min_length..=config.max_new_tokens).contains(&ids.len()),
            "{} tokens generated",
            ids.len()
        );
        let eos_at = ids.iter().position(|&id| id == EOS);
        assert!(eos_at.map_or(true, |i| i >= config.min_length));
    }
}

#[test]
fn narrative_has_no_template_markers() {
    let runtime = Arc::new(ModelRuntime::new(CountingLoader::new()));
    let executor = InferenceExecutor::new(runtime, seeded_config());

    let narrative = executor
        .generate_narrative("1. 아기가 웃었다\n2. 낮잠을 잤다")
        .unwrap();

    assert!(!narrative.is_empty());
    assert!(!narrative.contains("[DIARY]"));
    assert!(!narrative.contains("[SUMMARY]"));
    assert_eq!(narrative, narrative.trim());
}

#[test]
fn fixed_seed_is_reproducible() {
    let runtime = Arc::new(ModelRuntime::new(CountingLoader::new()));
    let executor = InferenceExecutor::new(runtime, seeded_config());

    let a = executor.generate_narrative("1. 산책").unwrap();
    let b = executor.generate_narrative("1. 산책").unwrap();
    assert_eq!(a, b);
}

#[test]
#[ignore] // Requires model files: run with: AIARY_MODEL_DIR=... cargo test -- --ignored
fn real_model_generates_narrative() {
    use aiary::config::AiaryConfig;
    use aiary::runtime::onnx::OnnxRuntimeLoader;

    let config = AiaryConfig::load().unwrap();
    let runtime = Arc::new(ModelRuntime::new(OnnxRuntimeLoader::from_config(&config)));
    let executor = InferenceExecutor::new(runtime, seeded_config());
    let narrative = executor
        .generate_narrative("1. 아기가 웃었다\n2. 낮잠을 잤다")
        .unwrap();
    assert!(!narrative.is_empty());
    assert!(!narrative.contains("[DIARY]"));
}
