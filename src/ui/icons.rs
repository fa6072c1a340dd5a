//! Shared UI icons. Each has a plain-text fallback for terminals without
//! emoji support.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static STOP: Emoji<'_, '_> = Emoji("⏹️  ", "[STOP]");
pub static BLOCKER: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK]");
pub static LINK: Emoji<'_, '_> = Emoji("🔗 ", "->");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
