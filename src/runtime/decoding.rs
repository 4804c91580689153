//! Autoregressive decoding: logits processors, nucleus sampling, and the step loop.
//!
//! Processors run in a fixed order on every step: repetition penalty,
//! no-repeat n-gram ban, minimum-length EOS suppression, forced BOS, then
//! temperature and top-p before sampling.

use std::collections::HashSet;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::SpecialTokens;
use crate::config::GenerationConfig;
use crate::error::{DiaryError, Result};

/// Run the decoder until EOS or `max_new_tokens`.
///
/// `next_logits` receives the full decoder sequence so far (starting with
/// `decoder_start`) and returns logits for the next position. The returned
/// ids exclude the start token and include the final EOS if one was sampled.
pub fn decode_sequence<R, F>(
    special: &SpecialTokens,
    config: &GenerationConfig,
    rng: &mut R,
    cancel: &CancellationToken,
    mut next_logits: F,
) -> Result<Vec<u32>>
where
    R: Rng + ?Sized,
    F: FnMut(&[u32]) -> Result<Vec<f32>>,
{
    let mut sequence = vec![special.decoder_start];

    for step in 0..config.max_new_tokens {
        if cancel.is_cancelled() {
            return Err(DiaryError::Cancelled);
        }

        let mut logits = next_logits(&sequence)?;
        let generated = &sequence[1..];

        apply_repetition_penalty(&mut logits, &sequence, config.repetition_penalty);
        ban_repeated_ngrams(&mut logits, generated, config.no_repeat_ngram_size);
        if generated.len() < config.min_length {
            suppress(&mut logits, special.eos);
        }
        if step == 0 {
            if let Some(bos) = special.forced_bos {
                force(&mut logits, bos);
            }
        }

        let next = if config.do_sample {
            apply_temperature(&mut logits, config.temperature);
            let probs = top_p_probabilities(&logits, config.top_p)?;
            sample(&probs, rng)?
        } else {
            argmax(&logits)?
        };

        sequence.push(next);
        if next == special.eos {
            break;
        }
    }

    sequence.remove(0);
    Ok(sequence)
}

/// Penalize every token id already present in `previous`.
pub fn apply_repetition_penalty(logits: &mut [f32], previous: &[u32], penalty: f32) {
    if penalty == 1.0 {
        return;
    }
    let seen: HashSet<u32> = previous.iter().copied().collect();
    for id in seen {
        if let Some(score) = logits.get_mut(id as usize) {
            *score = if *score < 0.0 {
                *score * penalty
            } else {
                *score / penalty
            };
        }
    }
}

/// Forbid any token that would complete an n-gram already present in `generated`.
pub fn ban_repeated_ngrams(logits: &mut [f32], generated: &[u32], n: usize) {
    if n == 0 || generated.len() + 1 < n {
        return;
    }
    let prefix = &generated[generated.len() + 1 - n..];
    for window in generated.windows(n) {
        if &window[..n - 1] == prefix {
            suppress(logits, window[n - 1]);
        }
    }
}

pub fn apply_temperature(logits: &mut [f32], temperature: f32) {
    if temperature > 0.0 && temperature != 1.0 {
        for score in logits.iter_mut() {
            *score /= temperature;
        }
    }
}

/// Softmax over `logits`, keeping only the smallest set of most-likely tokens
/// whose cumulative probability reaches `top_p` (at least one token).
///
/// Returned probabilities are renormalized; excluded tokens are zero.
pub fn top_p_probabilities(logits: &[f32], top_p: f32) -> Result<Vec<f32>> {
    let mut probs = softmax(logits)?;
    if top_p >= 1.0 {
        return Ok(probs);
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let mut cumulative = 0.0f32;
    let mut keep = 0;
    for &idx in &order {
        if keep > 0 && cumulative >= top_p {
            break;
        }
        cumulative += probs[idx];
        keep += 1;
    }

    for &idx in &order[keep..] {
        probs[idx] = 0.0;
    }
    let total: f32 = probs.iter().sum();
    for p in probs.iter_mut() {
        *p /= total;
    }
    Ok(probs)
}

fn softmax(logits: &[f32]) -> Result<Vec<f32>> {
    let max = logits
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return Err(DiaryError::Inference("every token was masked out".into()));
    }
    let exps: Vec<f32> = logits
        .iter()
        .map(|&x| if x.is_finite() { (x - max).exp() } else { 0.0 })
        .collect();
    let total: f32 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / total).collect())
}

fn sample<R: Rng + ?Sized>(probs: &[f32], rng: &mut R) -> Result<u32> {
    let dist = WeightedIndex::new(probs).map_err(DiaryError::inference)?;
    Ok(dist.sample(rng) as u32)
}

fn argmax(logits: &[f32]) -> Result<u32> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, x)| x.is_finite())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i as u32)
        .ok_or_else(|| DiaryError::Inference("every token was masked out".into()))
}

fn suppress(logits: &mut [f32], id: u32) {
    if let Some(score) = logits.get_mut(id as usize) {
        *score = f32::NEG_INFINITY;
    }
}

fn force(logits: &mut [f32], id: u32) {
    for (i, score) in logits.iter_mut().enumerate() {
        if i != id as usize {
            *score = f32::NEG_INFINITY;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SPECIAL: SpecialTokens = SpecialTokens {
        eos: 1,
        decoder_start: 2,
        forced_bos: None,
    };

    fn greedy(min_length: usize, max_new_tokens: usize) -> GenerationConfig {
        GenerationConfig {
            do_sample: false,
            min_length,
            max_new_tokens,
            repetition_penalty: 1.0,
            no_repeat_ngram_size: 0,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn repetition_penalty_divides_and_multiplies() {
        let mut logits = vec![4.0, -2.0, 1.0];
        apply_repetition_penalty(&mut logits, &[0, 1, 1], 2.0);
        assert_eq!(logits, vec![2.0, -4.0, 1.0]);
    }

    #[test]
    fn repeated_trigram_is_banned() {
        // generated: 5 6 7 5 6  → next 7 would repeat "5 6 7"
        let mut logits = vec![0.0; 10];
        ban_repeated_ngrams(&mut logits, &[5, 6, 7, 5, 6], 3);
        assert_eq!(logits[7], f32::NEG_INFINITY);
        assert!(logits.iter().enumerate().all(|(i, x)| i == 7 || *x == 0.0));

        let mut logits = vec![0.0; 10];
        ban_repeated_ngrams(&mut logits, &[5], 3);
        assert!(logits.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn top_p_keeps_smallest_covering_set() {
        // softmax of ln(p) gives back p
        let logits: Vec<f32> = [0.5f32, 0.3, 0.15, 0.05].iter().map(|p| p.ln()).collect();
        let probs = top_p_probabilities(&logits, 0.7).unwrap();
        assert!(probs[0] > 0.0 && probs[1] > 0.0);
        assert_eq!(probs[2], 0.0);
        assert_eq!(probs[3], 0.0);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);

        let probs = top_p_probabilities(&logits, 0.1).unwrap();
        assert_eq!(probs, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn fully_masked_logits_are_an_error() {
        let logits = vec![f32::NEG_INFINITY; 4];
        assert!(matches!(
            top_p_probabilities(&logits, 0.9),
            Err(DiaryError::Inference(_))
        ));
        assert!(argmax(&logits).is_err());
    }

    #[test]
    fn eos_is_suppressed_until_min_length() {
        // A model that always prefers EOS, then token 10.
        let mut rng = StdRng::seed_from_u64(0);
        let ids = decode_sequence(&SPECIAL, &greedy(5, 50), &mut rng, &CancellationToken::new(), |_| {
            let mut logits = vec![0.0; 16];
            logits[1] = 10.0;
            logits[10] = 5.0;
            Ok(logits)
        })
        .unwrap();
        assert_eq!(ids, vec![10, 10, 10, 10, 10, 1]);
    }

    #[test]
    fn stops_at_max_new_tokens() {
        let mut rng = StdRng::seed_from_u64(0);
        let ids = decode_sequence(&SPECIAL, &greedy(0, 7), &mut rng, &CancellationToken::new(), |_| {
            let mut logits = vec![0.0; 16];
            logits[9] = 1.0;
            Ok(logits)
        })
        .unwrap();
        assert_eq!(ids.len(), 7);
        assert!(!ids.contains(&SPECIAL.eos));
    }

    #[test]
    fn decoder_sees_start_token_and_history() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut seen = Vec::new();
        decode_sequence(&SPECIAL, &greedy(0, 3), &mut rng, &CancellationToken::new(), |ids| {
            seen.push(ids.to_vec());
            let mut logits = vec![0.0; 16];
            logits[4 + ids.len()] = 1.0;
            Ok(logits)
        })
        .unwrap();
        assert_eq!(seen, vec![vec![2], vec![2, 5], vec![2, 5, 6]]);
    }

    #[test]
    fn forced_bos_applies_to_first_step_only() {
        let special = SpecialTokens {
            forced_bos: Some(0),
            ..SPECIAL
        };
        let mut rng = StdRng::seed_from_u64(0);
        let ids = decode_sequence(&special, &greedy(0, 3), &mut rng, &CancellationToken::new(), |_| {
            let mut logits = vec![0.0; 16];
            logits[8] = 3.0;
            Ok(logits)
        })
        .unwrap();
        assert_eq!(ids, vec![0, 8, 8]);
    }

    #[test]
    fn sampling_is_reproducible_with_seed() {
        let config = GenerationConfig {
            min_length: 0,
            max_new_tokens: 30,
            ..GenerationConfig::default()
        };
        let logits_fn = |ids: &[u32]| -> Result<Vec<f32>> {
            Ok((0..64).map(|i| ((i * 7 + ids.len()) % 13) as f32 * 0.3).collect())
        };
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            decode_sequence(&SPECIAL, &config, &mut rng, &CancellationToken::new(), logits_fn).unwrap()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn sampled_output_has_no_repeated_trigram() {
        let config = GenerationConfig {
            min_length: 60,
            max_new_tokens: 60,
            ..GenerationConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let ids = decode_sequence(&SPECIAL, &config, &mut rng, &CancellationToken::new(), |_| {
            Ok(vec![1.0; 32])
        })
        .unwrap();
        let trigrams: Vec<&[u32]> = ids.windows(3).collect();
        let unique: HashSet<&[u32]> = trigrams.iter().copied().collect();
        assert_eq!(trigrams.len(), unique.len());
    }

    #[test]
    fn cancelled_token_stops_decoding() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rng = StdRng::seed_from_u64(0);
        let err = decode_sequence(&SPECIAL, &greedy(0, 10), &mut rng, &cancel, |_| Ok(vec![0.0; 4]))
            .unwrap_err();
        assert!(matches!(err, DiaryError::Cancelled));
    }
}
