use chrono::{Duration, TimeZone, Utc};

use muninn::{PackingPolicy, Prompt, estimate_tokens, pack};

/// Prompts of assorted lengths, one minute apart.
fn prompts(lengths: &[usize]) -> Vec<Prompt> {
    let base = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    lengths
        .iter()
        .enumerate()
        .map(|(i, len)| {
            Prompt::new(
                format!("{i}:{}", "w".repeat(*len)),
                base + Duration::minutes(i as i64),
                "session",
            )
        })
        .collect()
}

fn flatten(batches: &[muninn::Batch]) -> Vec<Prompt> {
    batches.iter().flat_map(|b| b.prompts.clone()).collect()
}

#[test]
fn concatenated_batches_reproduce_input() {
    let input = prompts(&[10, 300, 5, 80, 1200, 40, 40, 40, 900, 3]);
    for budget in [20, 64, 150, 400, 10_000] {
        let batches = pack(&input, budget, PackingPolicy::Chronological);
        assert_eq!(flatten(&batches), input, "budget {budget}");
    }
}

#[test]
fn no_batch_exceeds_budget_unless_single_oversized_prompt() {
    let input = prompts(&[10, 300, 5, 80, 1200, 40, 40, 40, 900, 3]);
    for budget in [20, 64, 150, 400] {
        for batch in pack(&input, budget, PackingPolicy::Chronological) {
            let estimate: usize = batch.prompts.iter().map(|p| estimate_tokens(&p.text)).sum();
            assert_eq!(estimate, batch.estimated_tokens);
            if estimate > budget {
                assert_eq!(batch.len(), 1, "only single-prompt batches may exceed {budget}");
            }
        }
    }
}

#[test]
fn greedy_packing_fills_batches() {
    // each prompt estimates to the same size; three fit per batch
    let input = prompts(&[36, 36, 36, 36, 36, 36, 36]);
    let per_prompt = estimate_tokens(&input[0].text);
    let batches = pack(&input, per_prompt * 3, PackingPolicy::Chronological);

    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[test]
fn priority_policy_keeps_every_prompt() {
    let input = prompts(&[10, 300, 5, 80]);
    let batches = pack(&input, 100, PackingPolicy::Priority);
    let mut packed = flatten(&batches);
    let mut expected = input.clone();
    packed.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    expected.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    assert_eq!(packed, expected);

    // largest first
    assert_eq!(batches[0].prompts[0], input[1]);
}

#[test]
fn estimate_tolerates_multibyte_text() {
    // counted in chars, not bytes
    let ascii = estimate_tokens("abcdefgh");
    let accented = estimate_tokens("àbçdéfgh");
    assert_eq!(ascii, accented);
}
