//! Configuration types deserialized from `vela.toml`.

use serde::Deserialize;

/// The whole configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct VelaConfig {
    /// Options of the elaboration pipeline.
    #[serde(default)]
    pub elaborate: ElabOptions,
}

/// Switches and limits of the elaboration pipeline.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ElabOptions {
    /// Name of the top module. When absent, every module that is not
    /// instantiated by another module is elaborated as a top.
    pub top: Option<String>,
    /// Assign `x` on hold paths of combinational processes instead of
    /// inferring latches.
    pub nolatches: bool,
    /// Never keep initialised memories as memories; promote them when they
    /// are also written outside initial blocks.
    pub nomeminit: bool,
    /// Disable memory-to-register promotion entirely.
    pub nomem2reg: bool,
    /// Promote every memory to registers.
    pub mem2reg: bool,
    /// Do not turn modules with empty bodies into blackboxes.
    pub noblackbox: bool,
    /// Only emit port declarations; every module becomes a blackbox.
    pub lib: bool,
    /// Turn whitebox modules into blackboxes.
    pub nowb: bool,
    /// Allow instantiating `$`-prefixed internal cell types directly.
    pub icells: bool,
    /// Emit a wire for every parameter.
    pub pwires: bool,
    /// Declare undeclared identifiers as 1-bit wires instead of failing.
    pub autowire: bool,
    /// Keep an existing module when a module of the same name is elaborated again.
    pub nooverwrite: bool,
    /// Replace an existing module when a module of the same name is elaborated again.
    pub overwrite: bool,
    /// Drop `$display`-like system tasks silently instead of with a debug log.
    pub nodisplay: bool,
    /// Log a dump of each module tree before simplification.
    pub dump_ast1: bool,
    /// Log a dump of each module tree after simplification.
    pub dump_ast2: bool,
    /// Maximum nesting of constant function calls.
    pub max_recursion_depth: u32,
    /// Maximum iterations of a single unrolled loop.
    pub max_loop_iterations: u32,
}

impl Default for ElabOptions {
    fn default() -> Self {
        Self {
            top: None,
            nolatches: false,
            nomeminit: false,
            nomem2reg: false,
            mem2reg: false,
            noblackbox: false,
            lib: false,
            nowb: false,
            icells: false,
            pwires: false,
            autowire: false,
            nooverwrite: false,
            overwrite: false,
            nodisplay: false,
            dump_ast1: false,
            dump_ast2: false,
            max_recursion_depth: 1000,
            max_loop_iterations: 1 << 20,
        }
    }
}
