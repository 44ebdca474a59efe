//! Plans and actions.
//!
//! A plan is an ordered list of actions for one turn. Action names form a
//! closed vocabulary: the built-in kinds plus externally discovered tool
//! names. Anything else parses to `Unknown` and is skipped at execution
//! time rather than failing a lookup.
//!
//! The planner LLM is held to one wire contract:
//! `{"actions": [{"name": str, "params": obj}]}`. Output that does not
//! match it, or that is missing the `actions` key, is discarded in favor
//! of a fixed fallback plan.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What an action does. `Generate` is the terminal marker that ends the
/// loop for the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Chat,
    Retrieve,
    Rerank,
    Search,
    Generate,
    /// An externally discovered tool, dispatched by its advertised name.
    External(String),
    /// An unrecognized name; executed as a no-op.
    Unknown(String),
}

impl ActionKind {
    /// Wire name of this kind.
    pub fn name(&self) -> &str {
        match self {
            Self::Chat => "chat",
            Self::Retrieve => "retrieve",
            Self::Rerank => "rerank",
            Self::Search => "search",
            Self::Generate => "generate",
            Self::External(name) | Self::Unknown(name) => name,
        }
    }
}

/// One step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub params: Value,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            params: Value::Object(serde_json::Map::new()),
        }
    }
}

/// An ordered list of actions, executed front to back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Wire shape of the planner contract.
#[derive(Debug, Deserialize)]
struct WirePlan {
    actions: Vec<WireAction>,
}

#[derive(Debug, Deserialize)]
struct WireAction {
    name: String,
    #[serde(default)]
    params: Value,
}

/// Parse planner output against the strict JSON contract.
///
/// `resolve` maps an action name to its kind; the caller supplies it so
/// discovered external tool names resolve without this module knowing the
/// registry. Code fences around the JSON are tolerated. Returns `None` on
/// any deviation from the contract, which the planner turns into the
/// fallback plan.
pub fn parse_plan<F>(raw: &str, resolve: F) -> Option<Plan>
where
    F: Fn(&str) -> ActionKind,
{
    let stripped = strip_code_fence(raw.trim());
    let wire: WirePlan = serde_json::from_str(stripped).ok()?;

    let actions = wire
        .actions
        .into_iter()
        .map(|a| {
            let params = if a.params.is_object() {
                a.params
            } else {
                Value::Object(serde_json::Map::new())
            };
            Action {
                kind: resolve(&a.name),
                params,
            }
        })
        .collect();

    Some(Plan { actions })
}

/// The fixed safe plan used when planning fails or is skipped.
pub fn fallback_plan(has_documents: bool) -> Plan {
    let kinds = if has_documents {
        vec![ActionKind::Retrieve, ActionKind::Rerank, ActionKind::Generate]
    } else {
        vec![ActionKind::Chat, ActionKind::Generate]
    };
    Plan {
        actions: kinds.into_iter().map(Action::new).collect(),
    }
}

/// Resolve a built-in action name. Unrecognized names become `Unknown`;
/// the registry upgrades names it has discovered to `External`.
pub fn builtin_kind(name: &str) -> ActionKind {
    match name {
        "chat" => ActionKind::Chat,
        "retrieve" => ActionKind::Retrieve,
        "rerank" => ActionKind::Rerank,
        "search" => ActionKind::Search,
        "generate" => ActionKind::Generate,
        other => ActionKind::Unknown(other.to_string()),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    // Drop an optional language tag on the opening fence
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(raw)
        .trim()
}
