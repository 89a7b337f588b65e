/// Source of raw environment values. Production reads the process environment;
/// tests hand in a map so they never mutate global state.
pub(super) trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

pub(super) struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

#[cfg(test)]
impl EnvSource for std::collections::HashMap<&str, &str> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).map(|value| (*value).to_string())
    }
}

#[must_use]
pub(super) fn read_non_empty_env(env: &dyn EnvSource, name: &str) -> Option<String> {
    env.var(name)
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Unparseable or below-minimum values yield `None` so the caller keeps its current value.
#[must_use]
pub(super) fn read_env_u64(env: &dyn EnvSource, name: &str, min_value: u64) -> Option<u64> {
    env.var(name)
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|value| *value >= min_value)
}
