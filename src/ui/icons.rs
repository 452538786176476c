pub struct Icons;

impl Icons {
    pub const BOOK: &str = "📚";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const LINK: &str = "🔗";
    pub const FILE: &str = "📄";
    pub const NEW: &str = "✨";
    pub const DATABASE: &str = "🗄️";
    pub const TAG: &str = "🏷️";
    pub const UP: &str = "⬆️";
    pub const DOWN: &str = "⬇️";
    pub const MERGE: &str = "🔀";
    pub const SHARE: &str = "📤";
}
