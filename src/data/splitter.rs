// ============================================================
// Layer 4: Train/Validation Splitter
// ============================================================
// bAbI ships only train and test files, so the validation set
// is carved out of the training file.
//
// The split is NOT shuffled: the last `valid_fraction` of the
// file becomes validation, identical for every run. Shuffling
// for SGD happens per epoch in TaskData::batches.
//
// Reference: Rust Book §8 (Vectors)

/// Split `samples` into (train, validation), keeping file order.
///
/// # Arguments
/// * `samples`        - All training-file samples (consumed)
/// * `valid_fraction` - Proportion held out, e.g. 0.1 = 10%
pub fn split_train_valid<T>(mut samples: Vec<T>, valid_fraction: f64) -> (Vec<T>, Vec<T>) {
    let total = samples.len();
    let fraction = valid_fraction.clamp(0.0, 1.0);

    // e.g. 1000 samples * 0.1 = 100 → last 100 are validation
    let valid_len = ((total as f64) * fraction).round() as usize;
    let split_at  = total - valid_len.min(total);

    let valid = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        valid.len(),
    );

    (samples, valid)
}
