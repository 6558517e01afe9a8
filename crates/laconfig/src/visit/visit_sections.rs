use super::{Visit, Walk};
use crate::node::Section;

/// Recursively visit all [Section]s below (and including) a section, parents before children
pub trait VisitSections<'t> {
    fn visit_sections(&self, visitor: &mut dyn Visit<Section<'t>>);
}

impl<'t> VisitSections<'t> for Section<'t> {
    fn visit_sections(&self, visitor: &mut dyn Visit<Section<'t>>) {
        let mut pending = vec![*self];
        while let Some(section) = pending.pop() {
            if visitor.visit(section) == Walk::Skip {
                continue;
            }
            // reversed so the first child is visited next
            let children: Vec<_> = section.children().collect();
            pending.extend(children.into_iter().rev());
        }
    }
}
