//! Command line input for the TUI.
//!
//! Holds the text being typed after '/' and the commands entered before,
//! which Up/Down recall.


/// Current input mode of the application.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum InputMode {
    /// Keyboard shortcuts active.
    #[default]
    Normal,

    /// Typing a slash command.
    Command,
}


const HISTORY_LIMIT: usize = 50;


/// Input buffer for command entry.
#[derive( Debug, Default )]
pub struct InputBuffer {
    content: String,
    cursor: usize,
    history: Vec<String>,

    /// Position while browsing history; `None` when editing fresh text.
    recall: Option<usize>,
}


impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }


    /// Inserts a character at the cursor position.
    pub fn insert( &mut self, c: char ) {
        self.content.insert( self.cursor, c );
        self.cursor += c.len_utf8();
    }


    /// Deletes the character before the cursor.
    pub fn backspace( &mut self ) {
        if let Some( ( i, _ ) ) = self.content[ ..self.cursor ].char_indices().last() {
            self.content.remove( i );
            self.cursor = i;
        }
    }


    pub fn clear( &mut self ) {
        self.content.clear();
        self.cursor = 0;
        self.recall = None;
    }


    pub fn content( &self ) -> &str {
        &self.content
    }


    /// Cursor position in characters, for display.
    pub fn cursor_char_pos( &self ) -> usize {
        self.content[ ..self.cursor ].chars().count()
    }


    pub fn move_left( &mut self ) {
        if let Some( ( i, _ ) ) = self.content[ ..self.cursor ].char_indices().last() {
            self.cursor = i;
        }
    }


    pub fn move_right( &mut self ) {
        if let Some( c ) = self.content[ self.cursor.. ].chars().next() {
            self.cursor += c.len_utf8();
        }
    }


    pub fn is_empty( &self ) -> bool {
        self.content.is_empty()
    }


    /// Takes the typed text and remembers it for recall.
    pub fn submit( &mut self ) -> String {
        let line = std::mem::take( &mut self.content );
        self.cursor = 0;
        self.recall = None;
        if !line.trim().is_empty() && self.history.last() != Some( &line ) {
            self.history.push( line.clone() );
            if self.history.len() > HISTORY_LIMIT {
                self.history.remove( 0 );
            }
        }
        line
    }


    /// Replaces the text with the previous history entry.
    pub fn recall_previous( &mut self ) {
        if self.history.is_empty() {
            return;
        }
        let index = match self.recall {
            Some( 0 ) => 0,
            Some( i ) => i - 1,
            None => self.history.len() - 1,
        };
        self.load_recalled( index );
    }


    /// Moves toward newer entries; past the newest the line is empty again.
    pub fn recall_next( &mut self ) {
        match self.recall {
            Some( i ) if i + 1 < self.history.len() => self.load_recalled( i + 1 ),
            Some( _ ) => self.clear(),
            None => {}
        }
    }


    fn load_recalled( &mut self, index: usize ) {
        self.recall = Some( index );
        self.content = self.history[ index ].clone();
        self.cursor = self.content.len();
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn typed( buffer: &mut InputBuffer, text: &str ) {
        text.chars().for_each( |c| buffer.insert( c ) );
    }


    #[test]
    fn test_edit_multibyte() {
        let mut buffer = InputBuffer::new();
        typed( &mut buffer, "goto é" );
        buffer.move_left();
        buffer.insert( 'x' );
        assert_eq!( buffer.content(), "goto xé" );
        assert_eq!( buffer.cursor_char_pos(), 6 );
        buffer.move_right();
        buffer.backspace();
        assert_eq!( buffer.content(), "goto x" );
    }


    #[test]
    fn test_history_recall() {
        let mut buffer = InputBuffer::new();
        typed( &mut buffer, "expand" );
        assert_eq!( buffer.submit(), "expand" );
        typed( &mut buffer, "refresh" );
        buffer.submit();

        buffer.recall_previous();
        assert_eq!( buffer.content(), "refresh" );
        buffer.recall_previous();
        buffer.recall_previous();
        assert_eq!( buffer.content(), "expand" );
        buffer.recall_next();
        assert_eq!( buffer.content(), "refresh" );
        buffer.recall_next();
        assert!( buffer.is_empty() );
    }
}
