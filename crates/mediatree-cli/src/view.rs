//! Pane focus for the TUI.


/// Which pane receives navigation keys.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum Pane {
    /// The node tree on the left.
    #[default]
    Tree,

    /// The active view's main control.
    View,

    /// Help overlay.
    Help,

    /// Context menu of the selected node.
    Menu,
}


impl Pane {
    /// Returns the next pane in tab order. Overlays stay until dismissed.
    pub fn next_tab( self ) -> Self {
        match self {
            Pane::Tree => Pane::View,
            Pane::View => Pane::Tree,
            other => other,
        }
    }


    pub fn is_overlay( self ) -> bool {
        matches!( self, Pane::Help | Pane::Menu )
    }


    /// Key hints shown in the status line.
    pub fn hint( self ) -> &'static str {
        match self {
            Pane::Tree => " [/]Cmd [Tab]Pane [Enter]Show [Right/Left]Expand/Collapse [r]Refresh [m]Menu [?]Help [q]Quit ",
            Pane::View => " [/]Cmd [Tab]Pane [Up/Down]Select [Enter]Open [c]Columns [s]Status [i]Info [?]Help ",
            Pane::Help => " [?]Close [Esc]Close ",
            Pane::Menu => " [Up/Down]Select [Enter]Run [Esc]Close ",
        }
    }
}
