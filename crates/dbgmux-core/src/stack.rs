//! Stack frame and argument tree
//!
//! A stack is an ordered sequence of frames, innermost first in display
//! order; backends that enumerate outermost-first are reversed by their
//! adapter before reaching this builder. Frame identity is a backend
//! numeric ID that is not stable across stops, so the tree is rebuilt from
//! scratch on every "stack changed".
//!
//! Building is two-phase for backends that report frames and arguments via
//! separate requests: skeletons first, then arguments attached by frame
//! index.

use crate::location::Location;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct StackArgument {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    /// Backend-assigned frame index (0 = innermost).
    pub index: u32,
    pub function_name: String,
    pub location: Option<Location>,
    pub arguments: Vec<StackArgument>,
}

impl StackFrame {
    pub fn new(index: u32, function_name: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            index,
            function_name: function_name.into(),
            location,
            arguments: Vec::new(),
        }
    }
}

/// Frame list under construction or ready for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stack {
    frames: Vec<StackFrame>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase one: install the frame skeletons, innermost first.
    pub fn set_frames(&mut self, frames: Vec<StackFrame>) {
        self.frames = frames;
    }

    /// Phase two: attach arguments to the frame with the given backend
    /// index. An argument fetch that references an unknown frame index is
    /// dropped with a log entry, not a fatal error.
    pub fn attach_arguments(&mut self, frame_index: u32, args: Vec<StackArgument>) {
        match self.frames.iter_mut().find(|f| f.index == frame_index) {
            Some(frame) => frame.arguments = args,
            None => {
                debug!(frame_index, "dropping arguments for unknown frame");
            }
        }
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Pick the frame to auto-select once the stack is fully loaded.
    ///
    /// When a frame's function matches a configured assert/abort-handler
    /// pattern, the *caller* of the deepest matching frame is selected
    /// instead of the innermost frame: the frames inside an assertion
    /// handler are rarely what the user wants to see.
    pub fn initial_selection(&self, assert_patterns: &[String]) -> usize {
        let mut selected = 0;
        for (i, frame) in self.frames.iter().enumerate() {
            let matches = assert_patterns
                .iter()
                .any(|p| !p.is_empty() && frame.function_name.contains(p.as_str()));
            if matches {
                // mark the caller, if there is one
                if i + 1 < self.frames.len() {
                    selected = i + 1;
                }
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u32, func: &str) -> StackFrame {
        StackFrame::new(index, func, Some(Location::line("main.c", 10 + index)))
    }

    fn patterns() -> Vec<String> {
        vec!["JAssert".to_string(), "__assert_fail".to_string()]
    }

    #[test]
    fn test_two_phase_build() {
        let mut stack = Stack::new();
        stack.set_frames(vec![frame(0, "inner"), frame(1, "outer")]);
        stack.attach_arguments(
            1,
            vec![StackArgument {
                name: "argc".to_string(),
                value: "1".to_string(),
            }],
        );

        assert_eq!(stack.frames()[0].arguments.len(), 0);
        assert_eq!(stack.frames()[1].arguments.len(), 1);
        assert_eq!(stack.frames()[1].arguments[0].name, "argc");
    }

    #[test]
    fn test_unknown_frame_index_dropped() {
        let mut stack = Stack::new();
        stack.set_frames(vec![frame(0, "main")]);
        stack.attach_arguments(
            7,
            vec![StackArgument {
                name: "x".to_string(),
                value: "2".to_string(),
            }],
        );
        assert_eq!(stack.frames()[0].arguments.len(), 0);
    }

    #[test]
    fn test_selection_defaults_to_innermost() {
        let mut stack = Stack::new();
        stack.set_frames(vec![frame(0, "compute"), frame(1, "main")]);
        assert_eq!(stack.initial_selection(&patterns()), 0);
    }

    #[test]
    fn test_assert_frame_selects_caller() {
        let mut stack = Stack::new();
        stack.set_frames(vec![
            frame(0, "__assert_fail"),
            frame(1, "checked_divide"),
            frame(2, "main"),
        ]);
        assert_eq!(stack.initial_selection(&patterns()), 1);
    }

    #[test]
    fn test_deepest_match_wins() {
        // Two matching frames; the caller of the deepest one is selected.
        let mut stack = Stack::new();
        stack.set_frames(vec![
            frame(0, "abort_inner"),
            frame(1, "JAssertHandler"),
            frame(2, "checked_divide"),
            frame(3, "main"),
        ]);
        assert_eq!(stack.initial_selection(&patterns()), 2);
    }

    #[test]
    fn test_assert_at_top_with_no_caller() {
        let mut stack = Stack::new();
        stack.set_frames(vec![frame(0, "JAssertHandler")]);
        assert_eq!(stack.initial_selection(&patterns()), 0);
    }
}
