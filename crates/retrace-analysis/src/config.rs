//! Analysis configuration.
//!
//! Controls how the program-wide passes fan out across procedures and a few
//! knobs of the individual analyses.

/// How per-procedure work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    /// One procedure at a time, in program order.
    Sequential,
    /// Fan out across the rayon thread pool.
    #[default]
    Parallel,
}

impl Parallelism {
    /// Parses a parallelism setting from a driver flag.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sequential" | "serial" | "off" | "0" | "false" => Some(Self::Sequential),
            "parallel" | "on" | "1" | "true" | "auto" => Some(Self::Parallel),
            _ => None,
        }
    }

    /// Returns the name of the setting.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        }
    }
}

/// Default bound on the number of steps of one post-dominator walk.
pub const DEFAULT_POST_DOMINATOR_WALK_LIMIT: usize = 10_000;

/// Configuration for signature synthesis and structuring.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Scheduling of per-procedure work.
    pub parallelism: Parallelism,
    /// Insert `use` statements for register out-arguments in exit blocks.
    pub emit_out_argument_uses: bool,
    /// Steps after which a common post-dominator walk gives up.
    pub post_dominator_walk_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::default(),
            emit_out_argument_uses: true,
            post_dominator_walk_limit: DEFAULT_POST_DOMINATOR_WALK_LIMIT,
        }
    }
}

impl AnalysisConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that processes procedures one at a time.
    pub fn sequential() -> Self {
        Self::default().with_parallelism(Parallelism::Sequential)
    }

    /// Sets the scheduling of per-procedure work.
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Enables or disables `use` statements for out-arguments.
    pub fn with_out_argument_uses(mut self, emit: bool) -> Self {
        self.emit_out_argument_uses = emit;
        self
    }

    /// Sets the post-dominator walk bound. Zero is raised to one.
    pub fn with_post_dominator_walk_limit(mut self, limit: usize) -> Self {
        self.post_dominator_walk_limit = limit.max(1);
        self
    }

    /// Returns true if per-procedure work runs on the thread pool.
    pub fn is_parallel(&self) -> bool {
        self.parallelism == Parallelism::Parallel
    }

    /// Parses a parallelism flag, keeping the rest of the configuration.
    pub fn parse_parallelism(self, s: &str) -> Option<Self> {
        Parallelism::parse(s).map(|p| self.with_parallelism(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_parse() {
        assert_eq!(Parallelism::parse("sequential"), Some(Parallelism::Sequential));
        assert_eq!(Parallelism::parse("OFF"), Some(Parallelism::Sequential));
        assert_eq!(Parallelism::parse("parallel"), Some(Parallelism::Parallel));
        assert_eq!(Parallelism::parse("auto"), Some(Parallelism::Parallel));
        assert_eq!(Parallelism::parse("sometimes"), None);
    }

    #[test]
    fn test_config_default() {
        let config = AnalysisConfig::default();
        assert!(config.is_parallel());
        assert!(config.emit_out_argument_uses);
        assert_eq!(config.post_dominator_walk_limit, DEFAULT_POST_DOMINATOR_WALK_LIMIT);
    }

    #[test]
    fn test_config_builders() {
        let config = AnalysisConfig::sequential()
            .with_out_argument_uses(false)
            .with_post_dominator_walk_limit(0);
        assert!(!config.is_parallel());
        assert!(!config.emit_out_argument_uses);
        assert_eq!(config.post_dominator_walk_limit, 1);
    }

    #[test]
    fn test_parse_parallelism_keeps_other_fields() {
        let config = AnalysisConfig::new()
            .with_out_argument_uses(false)
            .parse_parallelism("serial")
            .unwrap();
        assert_eq!(config.parallelism, Parallelism::Sequential);
        assert!(!config.emit_out_argument_uses);
        assert!(AnalysisConfig::new().parse_parallelism("bogus").is_none());
    }
}
