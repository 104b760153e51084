//! Rule data model, rulebook/variables loading, and the vault-marker
//! surface of the external decryption collaborator.

pub mod loader;
pub mod model;
pub mod vault;

pub use loader::{load_rulebook, load_vars, substitute_variables};
pub use model::{Action, EventData, Rule, RuleGroup, RuleGroupQueue, SourceDeclaration};
