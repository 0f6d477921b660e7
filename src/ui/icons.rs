//! Shared UI icons, with plain-text fallbacks for terminals without emoji.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
pub static BLOCKER: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK]");
pub static LOOP: Emoji<'_, '_> = Emoji("🔄 ", "[LOOP]");
pub static HANDOFF: Emoji<'_, '_> = Emoji("📤 ", "[HANDOFF]");
