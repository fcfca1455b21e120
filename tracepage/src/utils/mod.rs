use std::sync::OnceLock;

pub fn current_thread_id_u32() -> u32 {
  use std::collections::hash_map::DefaultHasher;
  use std::hash::{Hash, Hasher};
  let mut hasher = DefaultHasher::new();
  std::thread::current().id().hash(&mut hasher);
  hasher.finish() as u32
}

/// Hostname of this machine, resolved on first use. Falls back to
/// `"unknown"` when the name is not valid UTF-8.
pub fn hostname() -> &'static str {
  static HOSTNAME: OnceLock<String> = OnceLock::new();
  HOSTNAME.get_or_init(|| {
    gethostname::gethostname()
      .into_string()
      .unwrap_or_else(|_| "unknown".to_string())
  })
}
