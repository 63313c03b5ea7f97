use crate::spec::ContainerSpec;
use crate::types::Fingerprint;

/// Compute the content fingerprint of a container spec.
///
/// Covers name, image, command tokens and argument tokens in declaration
/// order, and environment entries ordered by name, so reordering `env` in
/// the spec file never changes the digest. Every record is a field tag and
/// its value, each length-prefixed, so token boundaries survive embedded
/// newlines or `=` and `command: [a]` hashes differently from `args: [a]`.
pub fn fingerprint(spec: &ContainerSpec) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();

    record(&mut hasher, "name", &spec.name);
    record(&mut hasher, "image", &spec.image);
    for token in &spec.command {
        record(&mut hasher, "cmd", token);
    }
    for token in &spec.args {
        record(&mut hasher, "arg", token);
    }
    for (name, value) in spec.environment() {
        record(&mut hasher, "env.name", &name);
        record(&mut hasher, "env.value", &value);
    }

    Fingerprint::new(hasher.finalize().to_hex().to_string())
}

fn record(hasher: &mut blake3::Hasher, tag: &str, value: &str) {
    for part in [tag, value] {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
}
