pub struct Icons;

impl Icons {
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const TABLE: &str = "📋";
    pub const KEY: &str = "🔑";
    pub const LINK: &str = "🔗";
    pub const BRAIN: &str = "🧠";
    pub const DATABASE: &str = "🗄️";
}
