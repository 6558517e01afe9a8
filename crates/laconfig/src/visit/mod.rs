//! visitor pattern helpers
mod visit_sections;
pub use visit_sections::VisitSections;

/// What a walk does after visiting a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// descend into the children of the visited node
    Continue,
    /// do not descend, carry on with the next sibling
    Skip,
}

/// Visitor that visits its subjects by value
pub trait Visit<T> {
    fn visit(&mut self, value: T) -> Walk;
}

// blanket impl for FnMut
impl<T, F> Visit<T> for F
where
    F: FnMut(T) -> Walk,
{
    fn visit(&mut self, value: T) -> Walk {
        self(value)
    }
}
