//! Pad abstraction for element and container ports.
//!
//! Pads are the connection points of native objects. Elements get their
//! static pads from the factory's templates; containers get ghost pads that
//! forward to a pad of one of their children.

/// Direction of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// Receives data from upstream ("sink" pads).
    Input,
    /// Sends data downstream ("src" pads).
    Output,
}

/// Whether a pad is always present or created dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadPresence {
    /// Pad is always present on the element.
    Always,
    /// Pad appears at runtime (e.g. decodebin outputs).
    Sometimes,
    /// Pad is created when requested.
    Request,
}

/// Template a factory uses to create pads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadTemplate {
    /// Pad name.
    pub name: &'static str,
    /// Direction.
    pub direction: PadDirection,
    /// Presence.
    pub presence: PadPresence,
}

impl PadTemplate {
    /// Create a new pad template.
    pub const fn new(name: &'static str, direction: PadDirection, presence: PadPresence) -> Self {
        Self {
            name,
            direction,
            presence,
        }
    }

    /// The standard always-present input pad named "sink".
    pub const fn sink() -> Self {
        Self::new("sink", PadDirection::Input, PadPresence::Always)
    }

    /// The standard always-present output pad named "src".
    pub const fn src() -> Self {
        Self::new("src", PadDirection::Output, PadPresence::Always)
    }
}

/// A pad instance on a native object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pad {
    name: String,
    direction: PadDirection,
    ghost: bool,
}

impl Pad {
    /// Create a static pad from a template.
    pub fn from_template(template: &PadTemplate) -> Self {
        Self {
            name: template.name.to_string(),
            direction: template.direction,
            ghost: false,
        }
    }

    /// Create a ghost pad mirroring `target`'s direction.
    pub fn ghost(name: impl Into<String>, target: &Pad) -> Self {
        Self {
            name: name.into(),
            direction: target.direction,
            ghost: true,
        }
    }

    /// Pad name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pad direction.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// Check if this is an input pad.
    pub fn is_input(&self) -> bool {
        self.direction == PadDirection::Input
    }

    /// Check if this is an output pad.
    pub fn is_output(&self) -> bool {
        self.direction == PadDirection::Output
    }

    /// Check if this pad forwards to a child's pad.
    pub fn is_ghost(&self) -> bool {
        self.ghost
    }
}

/// Collection of pads for one native object.
#[derive(Debug, Default, Clone)]
pub struct PadList {
    pads: Vec<Pad>,
}

impl PadList {
    /// Create an empty pad list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pads for every always-present template.
    pub fn from_templates(templates: &[PadTemplate]) -> Self {
        Self {
            pads: templates
                .iter()
                .filter(|t| t.presence == PadPresence::Always)
                .map(Pad::from_template)
                .collect(),
        }
    }

    /// Add a pad to the list.
    pub fn add(&mut self, pad: Pad) {
        self.pads.push(pad);
    }

    /// Remove a pad by name, returning it.
    pub fn remove(&mut self, name: &str) -> Option<Pad> {
        let idx = self.pads.iter().position(|p| p.name() == name)?;
        Some(self.pads.remove(idx))
    }

    /// Get a pad by name.
    pub fn get(&self, name: &str) -> Option<&Pad> {
        self.pads.iter().find(|p| p.name() == name)
    }

    /// Get the first pad with the given direction.
    pub fn first(&self, direction: PadDirection) -> Option<&Pad> {
        self.pads.iter().find(|p| p.direction() == direction)
    }

    /// Get all pads.
    pub fn iter(&self) -> impl Iterator<Item = &Pad> {
        self.pads.iter()
    }

    /// Get the number of pads.
    pub fn len(&self) -> usize {
        self.pads.len()
    }

    /// Check if the pad list is empty.
    pub fn is_empty(&self) -> bool {
        self.pads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_creation() {
        let input = Pad::from_template(&PadTemplate::sink());
        assert_eq!(input.name(), "sink");
        assert!(input.is_input());
        assert!(!input.is_ghost());

        let output = Pad::from_template(&PadTemplate::src());
        assert_eq!(output.name(), "src");
        assert!(output.is_output());
    }

    #[test]
    fn test_ghost_pad_mirrors_direction() {
        let target = Pad::from_template(&PadTemplate::src());
        let ghost = Pad::ghost("src", &target);
        assert!(ghost.is_ghost());
        assert!(ghost.is_output());
    }

    #[test]
    fn test_pad_list_skips_sometimes_templates() {
        let templates = [
            PadTemplate::sink(),
            PadTemplate::new("src_%u", PadDirection::Output, PadPresence::Sometimes),
        ];
        let mut list = PadList::from_templates(&templates);
        assert_eq!(list.len(), 1);
        assert!(list.get("sink").is_some());
        assert!(list.first(PadDirection::Output).is_none());

        list.add(Pad::from_template(&PadTemplate::src()));
        assert!(list.remove("src").is_some());
        assert!(list.remove("src").is_none());
    }
}
