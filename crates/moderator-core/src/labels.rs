//! Checkpoint class names and their public labels

/// Raw class names stored in the released multilingual checkpoint, in head order.
pub const DEFAULT_CHECKPOINT_CLASSES: &[&str] = &[
    "toxic",
    "severe_toxic",
    "obscene",
    "identity_attack",
    "insult",
    "threat",
    "sexual_explicit",
];

/// Checkpoint names that are published under a different label.
const RENAMES: &[(&str, &str)] = &[
    ("toxic", "toxicity"),
    ("identity_hate", "identity_attack"),
    ("severe_toxic", "severe_toxicity"),
];

/// Map a raw checkpoint class name to its public label.
pub fn remap_class_name(raw: &str) -> String {
    RENAMES
        .iter()
        .find(|(from, _)| *from == raw)
        .map(|(_, to)| (*to).to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Remap a list of raw class names, preserving order.
pub fn remap_class_names<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter().map(|name| remap_class_name(name.as_ref())).collect()
}

/// Default public labels (remapped [`DEFAULT_CHECKPOINT_CLASSES`]).
pub fn default_labels() -> Vec<String> {
    remap_class_names(DEFAULT_CHECKPOINT_CLASSES)
}
