pub mod assistant;
pub mod matching;
pub mod notifier;
pub mod preferences;
pub mod presence;
pub mod security;
pub mod tokens;
