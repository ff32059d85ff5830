use crate::middle::ir::{MemoryRef, normalize::normalize};

/// Decides whether two memory references may name the same location. The
/// scheduler and the forwarding rewriter only ever ask through this trait, so
/// a stronger analysis can be swapped in without touching either.
///
/// Despite the name, implementations used for forwarding must only return
/// `true` when the references are known to be the same location: a `true`
/// answer lets the pass replace a load with the value stored to the other
/// reference.
pub trait MayAlias {
    fn may_alias(&self, a: &MemoryRef, b: &MemoryRef) -> bool;
}

impl<F> MayAlias for F
where
    F: Fn(&MemoryRef, &MemoryRef) -> bool,
{
    fn may_alias(&self, a: &MemoryRef, b: &MemoryRef) -> bool {
        self(a, b)
    }
}

/// Same buffer and structurally equal indices after normalization. Indices
/// which are equal but written differently enough to survive normalization
/// are treated as distinct locations.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralAlias;

impl MayAlias for StructuralAlias {
    fn may_alias(&self, a: &MemoryRef, b: &MemoryRef) -> bool {
        a.buffer == b.buffer && (a.index == b.index || normalize(&a.index) == normalize(&b.index))
    }
}
