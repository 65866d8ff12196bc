//! Guardrail module - content-safety policy composition and selection.
//!
//! A guardrail is a named, versioned content-safety policy enforced by the
//! answering service on model input and output. This module decides *which*
//! policy is active; enforcement itself always happens server-side.
//!
//! - **[`catalog`]** - default category sets and fallback strings.
//! - **[`builder`]** - merges a [`PolicyOverride`] with catalog defaults into a
//!   complete [`GuardrailPolicy`].
//! - **[`registry`]** - the [`GuardrailIdentity`] set deployed for an
//!   environment, each with a mutable draft and immutable published versions.
//! - **[`selector`]** - the `id[:version]` selection token, strict and
//!   display resolution, and the [`SelectionState`] machine.
//! - **[`target`]** - attaching a guardrail to an external consumer such as
//!   an agent.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ragdesk::guardrail::*;
//!
//! let mut registry = GuardrailRegistry::with_presets("dev")?;
//! registry.publish("dev-full")?;
//!
//! let token = encode_token("dev-full", "1");
//! let resolved = resolve(&token, registry.list_identities())?;
//! assert!(resolved.policy().has_enforceable_content());
//! ```

pub mod builder;
pub mod catalog;
pub mod policy;
pub mod registry;
pub mod selector;
pub mod target;

pub use builder::{PolicyOverride, UseDefaults, build, override_schema};
pub use policy::{
    ContentFilter, DeniedTopic, FilterStrength, FilterType, GuardrailPolicy, PiiEntity,
    PiiEntityType, RegexFilter, SensitiveAction,
};
pub use registry::{GuardrailIdentity, GuardrailRegistry, PolicyVersion, Preset, Version};
pub use selector::{
    DRAFT, DisplaySelection, Resolved, SelectionState, TOKEN_SEPARATOR, Transition, decode_token,
    encode_token, is_current_selection, resolve, resolve_for_display, tokens,
};
pub use target::{
    ApplyOutcome, CurrentGuardrail, GuardrailRef, GuardrailTarget, InMemoryTarget,
    apply_to_target, detach_from_target,
};
