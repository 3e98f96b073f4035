use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::search::{self, SearchMatch};
use crate::types::MOTION_SAFETY_BOUND;
use crate::window::{line_cells, line_text, scrollback_len, total_lines};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyState {
    Normal,
    VisualChar,
    VisualLine,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharSearch {
    pub ch: char,
    pub forward: bool,
    pub till: bool,
}

/// What the caller must do after a copy-mode keystroke.
#[derive(Debug, PartialEq, Eq)]
pub enum CopyOutcome {
    None,
    /// Leave copy mode entirely.
    Exit,
    /// Text selected and yanked; copy mode stays open in Normal state.
    Yank(String),
    /// The match collector hit its cap; surface a notification.
    SearchSaturated,
}

/// Per-window copy-mode state: a navigator over the virtual
/// `(scrollback ∥ live screen)` line space. The cursor is stored as a
/// viewport position plus the scrollback offset; the absolute line is
/// derived against the emulator's current scrollback length.
pub struct CopyMode {
    pub state: CopyState,
    pub cursor_x: u16,
    pub cursor_y: u16,
    /// Lines scrolled back from the live screen.
    pub offset: usize,
    /// Visual anchor as (absolute line, column).
    pub anchor: Option<(usize, u16)>,
    pub search_input: String,
    pub search_forward: bool,
    /// Position the in-progress search started from, for incremental
    /// jumps and Esc cancel.
    search_origin: (usize, u16),
    pub query: String,
    pub matches: Vec<SearchMatch>,
    pub current_match: Option<usize>,
    matches_query: String,
    matches_seq: u64,
    pub last_char_search: Option<CharSearch>,
    pub pending_char_search: Option<(bool, bool)>, // (forward, till)
    count: Option<usize>,
    pending_g: bool,
}

impl CopyMode {
    pub fn new(parser: &vt100::Parser) -> Self {
        let (rows, cols) = parser.screen().size();
        let (cy, cx) = parser.screen().cursor_position();
        CopyMode {
            state: CopyState::Normal,
            cursor_x: cx.min(cols.saturating_sub(1)),
            cursor_y: cy.min(rows.saturating_sub(1)),
            offset: 0,
            anchor: None,
            search_input: String::new(),
            search_forward: true,
            search_origin: (0, 0),
            query: String::new(),
            matches: Vec::new(),
            current_match: None,
            matches_query: String::new(),
            matches_seq: u64::MAX,
            last_char_search: None,
            pending_char_search: None,
            count: None,
            pending_g: false,
        }
    }

    /// Absolute line the cursor is on.
    pub fn abs_line(&self, parser: &mut vt100::Parser) -> usize {
        let sb = scrollback_len(parser);
        sb.saturating_sub(self.offset) + self.cursor_y as usize
    }

    fn take_count(&mut self) -> usize {
        self.count.take().unwrap_or(1)
    }

    // ─── View positioning ───────────────────────────────────────────────

    /// Place the cursor on absolute line `abs`, scrolling so it sits near
    /// the vertical midpoint; the cursor only drifts from the midpoint at
    /// the scrollback boundaries.
    pub fn center_on(&mut self, parser: &mut vt100::Parser, abs: usize) {
        let (rows, _) = parser.screen().size();
        let rows = rows as usize;
        let sb = scrollback_len(parser);
        let total = sb + rows;
        let abs = abs.min(total.saturating_sub(1));
        let mid = rows / 2;
        // offset = sb - abs + y, solved for y = mid then clamped.
        let desired = sb as isize - abs as isize + mid as isize;
        let offset = desired.clamp(0, sb as isize) as usize;
        self.offset = offset;
        self.cursor_y = (abs + offset - sb) as u16;
    }

    /// Scroll the view without moving the cursor's absolute position
    /// unless it would leave the viewport. Returns the new offset.
    pub fn scroll(&mut self, parser: &mut vt100::Parser, delta: isize) -> usize {
        let sb = scrollback_len(parser);
        let (rows, _) = parser.screen().size();
        let new = (self.offset as isize + delta).clamp(0, sb as isize) as usize;
        self.offset = new;
        self.cursor_y = self.cursor_y.min(rows.saturating_sub(1));
        new
    }

    fn move_vertical(&mut self, parser: &mut vt100::Parser, delta: isize) {
        let abs = self.abs_line(parser) as isize + delta;
        self.center_on(parser, abs.max(0) as usize);
        let (_, cols) = parser.screen().size();
        self.cursor_x = self.cursor_x.min(cols.saturating_sub(1));
    }

    // ─── Key handling ───────────────────────────────────────────────────

    pub fn handle_key(
        &mut self,
        parser: &mut vt100::Parser,
        seq: u64,
        key: KeyEvent,
    ) -> CopyOutcome {
        if self.state == CopyState::Search {
            return self.handle_search_key(parser, seq, key);
        }
        if let Some((forward, till)) = self.pending_char_search {
            self.pending_char_search = None;
            match key.code {
                KeyCode::Char(ch) => {
                    let count = self.take_count();
                    let cs = CharSearch { ch, forward, till };
                    self.char_search(parser, cs, count);
                    self.last_char_search = Some(cs);
                }
                _ => {
                    self.count = None;
                }
            }
            return CopyOutcome::None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            // Counts. `0` is a motion unless a count is in progress.
            KeyCode::Char(d @ '1'..='9') if !ctrl => {
                let digit = d.to_digit(10).unwrap() as usize;
                self.count = Some(self.count.unwrap_or(0).saturating_mul(10).saturating_add(digit).min(999_999));
                return CopyOutcome::None;
            }
            KeyCode::Char('0') if !ctrl && self.count.is_some() => {
                self.count = Some(self.count.unwrap_or(0).saturating_mul(10).min(999_999));
                return CopyOutcome::None;
            }
            _ => {}
        }

        if self.pending_g {
            self.pending_g = false;
            if let KeyCode::Char('g') = key.code {
                let count = self.count.take();
                let target = count.map(|n| n.saturating_sub(1)).unwrap_or(0);
                self.center_on(parser, target);
                self.move_to_first_non_blank(parser);
                return CopyOutcome::None;
            }
            // Unknown g-chord: fall through and process the key normally.
        }

        let outcome = match (key.code, ctrl) {
            (KeyCode::Esc, _) => match self.state {
                CopyState::VisualChar | CopyState::VisualLine => {
                    self.state = CopyState::Normal;
                    self.anchor = None;
                    CopyOutcome::None
                }
                _ => CopyOutcome::Exit,
            },
            (KeyCode::Char('q'), false) => CopyOutcome::Exit,

            // Basic motions.
            (KeyCode::Char('h'), false) | (KeyCode::Left, _) => {
                let n = self.take_count() as u16;
                self.cursor_x = self.cursor_x.saturating_sub(n);
                CopyOutcome::None
            }
            (KeyCode::Char('l'), false) | (KeyCode::Right, _) => {
                let (_, cols) = parser.screen().size();
                let n = self.take_count() as u16;
                self.cursor_x = (self.cursor_x + n).min(cols.saturating_sub(1));
                CopyOutcome::None
            }
            (KeyCode::Char('j'), false) | (KeyCode::Down, _) => {
                let n = self.take_count() as isize;
                self.move_vertical(parser, n);
                CopyOutcome::None
            }
            (KeyCode::Char('k'), false) | (KeyCode::Up, _) => {
                let n = self.take_count() as isize;
                self.move_vertical(parser, -n);
                CopyOutcome::None
            }

            // Line motions.
            (KeyCode::Char('0'), false) => {
                self.cursor_x = 0;
                CopyOutcome::None
            }
            (KeyCode::Char('^'), false) => {
                self.move_to_first_non_blank(parser);
                CopyOutcome::None
            }
            (KeyCode::Char('$'), false) | (KeyCode::End, _) => {
                let abs = self.abs_line(parser);
                if let Some(col) = last_non_blank_col(parser, abs) {
                    self.cursor_x = col;
                }
                CopyOutcome::None
            }
            (KeyCode::Home, _) => {
                self.cursor_x = 0;
                CopyOutcome::None
            }

            // Paging.
            (KeyCode::Char('u'), true) => {
                let rows = parser.screen().size().0 as isize;
                self.move_vertical(parser, -(rows / 2).max(1));
                CopyOutcome::None
            }
            (KeyCode::Char('d'), true) => {
                let rows = parser.screen().size().0 as isize;
                self.move_vertical(parser, (rows / 2).max(1));
                CopyOutcome::None
            }
            (KeyCode::Char('b'), true) | (KeyCode::PageUp, _) => {
                let rows = parser.screen().size().0 as isize;
                self.move_vertical(parser, -rows.max(1));
                CopyOutcome::None
            }
            (KeyCode::Char('f'), true) | (KeyCode::PageDown, _) => {
                let rows = parser.screen().size().0 as isize;
                self.move_vertical(parser, rows.max(1));
                CopyOutcome::None
            }

            // Document and screen motions.
            (KeyCode::Char('g'), false) => {
                self.pending_g = true;
                CopyOutcome::None
            }
            (KeyCode::Char('G'), false) => {
                let total = total_lines(parser);
                let target = match self.count.take() {
                    Some(n) => n.saturating_sub(1),
                    None => total.saturating_sub(1),
                };
                self.center_on(parser, target);
                self.move_to_first_non_blank(parser);
                CopyOutcome::None
            }
            (KeyCode::Char('H'), false) => {
                self.cursor_y = 0;
                self.move_to_first_non_blank(parser);
                CopyOutcome::None
            }
            (KeyCode::Char('M'), false) => {
                self.cursor_y = parser.screen().size().0 / 2;
                self.move_to_first_non_blank(parser);
                CopyOutcome::None
            }
            (KeyCode::Char('L'), false) => {
                self.cursor_y = parser.screen().size().0.saturating_sub(1);
                self.move_to_first_non_blank(parser);
                CopyOutcome::None
            }

            // Paragraphs.
            (KeyCode::Char('{'), false) => {
                let n = self.take_count();
                for _ in 0..n {
                    self.paragraph(parser, false);
                }
                CopyOutcome::None
            }
            (KeyCode::Char('}'), false) => {
                let n = self.take_count();
                for _ in 0..n {
                    self.paragraph(parser, true);
                }
                CopyOutcome::None
            }

            // Words.
            (KeyCode::Char('w'), false) => {
                let n = self.take_count();
                self.word_forward(parser, false, n);
                CopyOutcome::None
            }
            (KeyCode::Char('W'), false) => {
                let n = self.take_count();
                self.word_forward(parser, true, n);
                CopyOutcome::None
            }
            (KeyCode::Char('b'), false) => {
                let n = self.take_count();
                self.word_backward(parser, false, n);
                CopyOutcome::None
            }
            (KeyCode::Char('B'), false) => {
                let n = self.take_count();
                self.word_backward(parser, true, n);
                CopyOutcome::None
            }
            (KeyCode::Char('e'), false) => {
                let n = self.take_count();
                self.word_end(parser, false, n);
                CopyOutcome::None
            }
            (KeyCode::Char('E'), false) => {
                let n = self.take_count();
                self.word_end(parser, true, n);
                CopyOutcome::None
            }

            // Bracket match.
            (KeyCode::Char('%'), false) => {
                self.bracket_match(parser);
                CopyOutcome::None
            }

            // Character search.
            (KeyCode::Char('f'), false) => {
                self.pending_char_search = Some((true, false));
                CopyOutcome::None
            }
            (KeyCode::Char('F'), false) => {
                self.pending_char_search = Some((false, false));
                CopyOutcome::None
            }
            (KeyCode::Char('t'), false) => {
                self.pending_char_search = Some((true, true));
                CopyOutcome::None
            }
            (KeyCode::Char('T'), false) => {
                self.pending_char_search = Some((false, true));
                CopyOutcome::None
            }
            (KeyCode::Char(';'), false) => {
                if let Some(cs) = self.last_char_search {
                    let n = self.take_count();
                    self.char_search(parser, cs, n);
                }
                CopyOutcome::None
            }
            (KeyCode::Char(','), false) => {
                if let Some(cs) = self.last_char_search {
                    let n = self.take_count();
                    let reversed = CharSearch { forward: !cs.forward, ..cs };
                    self.char_search(parser, reversed, n);
                }
                CopyOutcome::None
            }

            // Search.
            (KeyCode::Char('/'), false) => {
                self.begin_search(parser, true);
                CopyOutcome::None
            }
            (KeyCode::Char('?'), false) => {
                self.begin_search(parser, false);
                CopyOutcome::None
            }
            (KeyCode::Char('n'), false) => self.step_match(parser, seq, true),
            (KeyCode::Char('N'), false) => self.step_match(parser, seq, false),
            (KeyCode::Char('l'), true) => {
                self.matches.clear();
                self.current_match = None;
                // Invalidate the cache so the next n/N recollects.
                self.matches_query.clear();
                self.matches_seq = u64::MAX;
                CopyOutcome::None
            }

            // Visual selection.
            (KeyCode::Char('v'), false) => {
                if self.state == CopyState::VisualChar {
                    self.state = CopyState::Normal;
                    self.anchor = None;
                } else {
                    let abs = self.abs_line(parser);
                    self.state = CopyState::VisualChar;
                    self.anchor = Some((abs, self.cursor_x));
                }
                CopyOutcome::None
            }
            (KeyCode::Char('V'), false) => {
                if self.state == CopyState::VisualLine {
                    self.state = CopyState::Normal;
                    self.anchor = None;
                } else {
                    let abs = self.abs_line(parser);
                    self.state = CopyState::VisualLine;
                    self.anchor = Some((abs, self.cursor_x));
                }
                CopyOutcome::None
            }
            (KeyCode::Char('y'), false) | (KeyCode::Char('c'), false) => {
                match self.yank(parser) {
                    Some(text) => {
                        self.state = CopyState::Normal;
                        self.anchor = None;
                        CopyOutcome::Yank(text)
                    }
                    None => CopyOutcome::None,
                }
            }

            _ => CopyOutcome::None,
        };
        // A completed command consumes any dangling count; keys that open
        // a pending read (f/F/t/T, g) keep it for the follow-up.
        match key.code {
            KeyCode::Char('f' | 'F' | 't' | 'T' | 'g') if !ctrl => {}
            _ => self.count = None,
        }
        outcome
    }

    fn handle_search_key(
        &mut self,
        parser: &mut vt100::Parser,
        seq: u64,
        key: KeyEvent,
    ) -> CopyOutcome {
        match key.code {
            KeyCode::Esc => {
                self.state = CopyState::Normal;
                self.search_input.clear();
                self.matches.clear();
                self.current_match = None;
                let (line, col) = self.search_origin;
                self.center_on(parser, line);
                self.cursor_x = col;
                CopyOutcome::None
            }
            KeyCode::Enter => {
                self.query = self.search_input.clone();
                self.state = CopyState::Normal;
                self.incremental_jump(parser, seq)
            }
            KeyCode::Backspace => {
                self.search_input.pop();
                self.incremental_jump(parser, seq)
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.search_input.push(c);
                self.incremental_jump(parser, seq)
            }
            _ => CopyOutcome::None,
        }
    }

    // ─── Search plumbing ────────────────────────────────────────────────

    fn begin_search(&mut self, parser: &mut vt100::Parser, forward: bool) {
        self.state = CopyState::Search;
        self.search_forward = forward;
        self.search_input.clear();
        self.search_origin = (self.abs_line(parser), self.cursor_x);
    }

    /// Recompute the match list when the query or emulator content moved
    /// on. Returns true when the collector saturated.
    fn ensure_matches(&mut self, parser: &mut vt100::Parser, seq: u64, query: &str) -> bool {
        if query == self.matches_query && seq == self.matches_seq {
            return false;
        }
        let (matches, saturated) = search::collect_matches(parser, query);
        self.matches = matches;
        self.matches_query = query.to_string();
        self.matches_seq = seq;
        self.current_match = None;
        saturated
    }

    fn incremental_jump(&mut self, parser: &mut vt100::Parser, seq: u64) -> CopyOutcome {
        let query = self.search_input.clone();
        let saturated = self.ensure_matches(parser, seq, &query);
        let idx = if self.search_forward {
            search::first_forward(&self.matches, self.search_origin)
        } else {
            search::first_backward(&self.matches, self.search_origin)
        };
        self.current_match = idx;
        if let Some(i) = idx {
            self.jump_to_match(parser, i);
        }
        if saturated { CopyOutcome::SearchSaturated } else { CopyOutcome::None }
    }

    fn step_match(&mut self, parser: &mut vt100::Parser, seq: u64, same_direction: bool) -> CopyOutcome {
        let query = self.query.clone();
        if query.is_empty() {
            return CopyOutcome::None;
        }
        let saturated = self.ensure_matches(parser, seq, &query);
        if self.matches.is_empty() {
            return if saturated { CopyOutcome::SearchSaturated } else { CopyOutcome::None };
        }
        let forward = self.search_forward == same_direction;
        let next = match self.current_match {
            Some(cur) => search::step(&self.matches, cur, forward),
            None => {
                let cursor = (self.abs_line(parser), self.cursor_x);
                let idx = if forward {
                    search::first_forward(&self.matches, cursor)
                } else {
                    search::first_backward(&self.matches, cursor)
                };
                idx.unwrap_or(0)
            }
        };
        self.current_match = Some(next);
        self.jump_to_match(parser, next);
        if saturated { CopyOutcome::SearchSaturated } else { CopyOutcome::None }
    }

    fn jump_to_match(&mut self, parser: &mut vt100::Parser, idx: usize) {
        if let Some(m) = self.matches.get(idx).copied() {
            self.center_on(parser, m.line);
            self.cursor_x = m.start_col;
        }
    }

    // ─── Line helpers ───────────────────────────────────────────────────

    fn move_to_first_non_blank(&mut self, parser: &mut vt100::Parser) {
        let abs = self.abs_line(parser);
        self.cursor_x = first_non_blank_col(parser, abs).unwrap_or(0);
    }

    fn paragraph(&mut self, parser: &mut vt100::Parser, forward: bool) {
        let total = total_lines(parser);
        let mut abs = self.abs_line(parser);
        // Step off the current line, then stop at the next blank one.
        loop {
            if forward {
                if abs + 1 >= total {
                    abs = total.saturating_sub(1);
                    break;
                }
                abs += 1;
            } else {
                if abs == 0 {
                    break;
                }
                abs -= 1;
            }
            let blank = line_text(parser, abs).map(|t| t.trim().is_empty()).unwrap_or(true);
            if blank {
                break;
            }
        }
        self.center_on(parser, abs);
        self.cursor_x = 0;
    }

    // ─── Word motions ───────────────────────────────────────────────────

    fn word_forward(&mut self, parser: &mut vt100::Parser, big: bool, count: usize) {
        let mut pos = self.pos(parser);
        let mut budget = MOTION_SAFETY_BOUND;
        for _ in 0..count {
            let start = class_at(parser, pos, big);
            // Leave the current run.
            if start != CharClass::Space {
                while budget > 0 && class_at(parser, pos, big) == start {
                    match step_forward(parser, pos) {
                        Some(p) => pos = p,
                        None => break,
                    }
                    budget -= 1;
                }
            }
            // Skip whitespace to the next word start.
            while budget > 0 && class_at(parser, pos, big) == CharClass::Space {
                match step_forward(parser, pos) {
                    Some(p) => pos = p,
                    None => break,
                }
                budget -= 1;
            }
            if budget == 0 {
                break;
            }
        }
        self.goto(parser, pos);
    }

    fn word_backward(&mut self, parser: &mut vt100::Parser, big: bool, count: usize) {
        let mut pos = self.pos(parser);
        let mut budget = MOTION_SAFETY_BOUND;
        for _ in 0..count {
            // Step off the cursor, then skip whitespace.
            match step_backward(parser, pos) {
                Some(p) => pos = p,
                None => break,
            }
            while budget > 0 && class_at(parser, pos, big) == CharClass::Space {
                match step_backward(parser, pos) {
                    Some(p) => pos = p,
                    None => break,
                }
                budget -= 1;
            }
            // Walk to the start of this run.
            let class = class_at(parser, pos, big);
            if class == CharClass::Space {
                break;
            }
            while budget > 0 {
                match step_backward(parser, pos) {
                    Some(p) if class_at(parser, p, big) == class => {
                        pos = p;
                        budget -= 1;
                    }
                    _ => break,
                }
            }
            if budget == 0 {
                break;
            }
        }
        self.goto(parser, pos);
    }

    fn word_end(&mut self, parser: &mut vt100::Parser, big: bool, count: usize) {
        let mut pos = self.pos(parser);
        let mut budget = MOTION_SAFETY_BOUND;
        for _ in 0..count {
            match step_forward(parser, pos) {
                Some(p) => pos = p,
                None => break,
            }
            while budget > 0 && class_at(parser, pos, big) == CharClass::Space {
                match step_forward(parser, pos) {
                    Some(p) => pos = p,
                    None => break,
                }
                budget -= 1;
            }
            let class = class_at(parser, pos, big);
            if class == CharClass::Space {
                break;
            }
            while budget > 0 {
                match step_forward(parser, pos) {
                    Some(p) if class_at(parser, p, big) == class => {
                        pos = p;
                        budget -= 1;
                    }
                    _ => break,
                }
            }
            if budget == 0 {
                break;
            }
        }
        self.goto(parser, pos);
    }

    fn pos(&mut self, parser: &mut vt100::Parser) -> (usize, u16) {
        (self.abs_line(parser), self.cursor_x)
    }

    fn goto(&mut self, parser: &mut vt100::Parser, pos: (usize, u16)) {
        if pos.0 != self.abs_line(parser) {
            self.center_on(parser, pos.0);
        }
        self.cursor_x = pos.1;
    }

    // ─── Char search on the current line ────────────────────────────────

    fn char_search(&mut self, parser: &mut vt100::Parser, cs: CharSearch, count: usize) {
        let abs = self.abs_line(parser);
        let Some(cells) = line_cells(parser, abs) else { return };
        let mut col = self.cursor_x;
        let mut budget = MOTION_SAFETY_BOUND;
        for _ in 0..count {
            let mut idx = cell_index_for_col(&cells, col);
            let found = loop {
                if budget == 0 {
                    break None;
                }
                budget -= 1;
                if cs.forward {
                    if idx + 1 >= cells.len() {
                        break None;
                    }
                    idx += 1;
                } else {
                    if idx == 0 {
                        break None;
                    }
                    idx -= 1;
                }
                if cells[idx].1.chars().next() == Some(cs.ch) {
                    break Some(idx);
                }
            };
            match found {
                Some(i) => {
                    col = if cs.till {
                        let adj = if cs.forward { i.saturating_sub(1) } else { (i + 1).min(cells.len() - 1) };
                        cells[adj].0
                    } else {
                        cells[i].0
                    };
                }
                None => return,
            }
        }
        self.cursor_x = col;
    }

    // ─── Bracket matching ───────────────────────────────────────────────

    fn bracket_match(&mut self, parser: &mut vt100::Parser) {
        const OPEN: [char; 4] = ['(', '[', '{', '<'];
        const CLOSE: [char; 4] = [')', ']', '}', '>'];
        let abs = self.abs_line(parser);
        let Some(cells) = line_cells(parser, abs) else { return };
        let start_idx = cell_index_for_col(&cells, self.cursor_x);
        // On a bracket, or scan right to the first one on the line.
        let mut idx = start_idx;
        let bracket = loop {
            let ch = cells.get(idx).and_then(|(_, s)| s.chars().next());
            match ch {
                Some(c) if OPEN.contains(&c) || CLOSE.contains(&c) => break Some(c),
                Some(_) if idx + 1 < cells.len() => idx += 1,
                _ => break None,
            }
        };
        let Some(bracket) = bracket else { return };
        let (open, close, forward) = if let Some(k) = OPEN.iter().position(|&c| c == bracket) {
            (OPEN[k], CLOSE[k], true)
        } else {
            let k = CLOSE.iter().position(|&c| c == bracket).unwrap();
            (OPEN[k], CLOSE[k], false)
        };

        let mut depth = 0i32;
        let mut pos = (abs, cells[idx].0);
        let mut line_cache: Option<(usize, Vec<(u16, String)>)> = None;
        let mut budget = MOTION_SAFETY_BOUND * 10;
        loop {
            if budget == 0 {
                return;
            }
            budget -= 1;
            if !matches!(&line_cache, Some((l, _)) if *l == pos.0) {
                let Some(cells) = line_cells(parser, pos.0) else { return };
                line_cache = Some((pos.0, cells));
            }
            let ch = {
                let cached = &line_cache.as_ref().unwrap().1;
                cached
                    .get(cell_index_for_col(cached, pos.1))
                    .and_then(|(_, s)| s.chars().next())
            };
            match ch {
                Some(c) if c == open => depth += if forward { 1 } else { -1 },
                Some(c) if c == close => depth += if forward { -1 } else { 1 },
                _ => {}
            }
            if depth == 0 {
                self.goto(parser, pos);
                return;
            }
            let next = if forward { step_forward(parser, pos) } else { step_backward(parser, pos) };
            match next {
                Some(p) => pos = p,
                None => return,
            }
        }
    }

    // ─── Selection and yank ─────────────────────────────────────────────

    /// Ordered selection bounds as ((line, col), (line, col), line_wise),
    /// columns inclusive. Line-wise bounds are normalized to the first and
    /// last non-blank cells of the bounding lines.
    pub fn selection(&self, parser: &mut vt100::Parser) -> Option<((usize, u16), (usize, u16), bool)> {
        let anchor = self.anchor?;
        let sb = scrollback_len(parser);
        let cursor = (sb.saturating_sub(self.offset) + self.cursor_y as usize, self.cursor_x);
        match self.state {
            CopyState::VisualChar => {
                let (a, b) = if anchor <= cursor { (anchor, cursor) } else { (cursor, anchor) };
                Some((a, b, false))
            }
            CopyState::VisualLine => {
                let (top, bottom) = if anchor.0 <= cursor.0 {
                    (anchor.0, cursor.0)
                } else {
                    (cursor.0, anchor.0)
                };
                let start_col = first_non_blank_col(parser, top).unwrap_or(0);
                let end_col = last_non_blank_col(parser, bottom).unwrap_or(0);
                Some(((top, start_col), (bottom, end_col), true))
            }
            _ => None,
        }
    }

    fn yank(&mut self, parser: &mut vt100::Parser) -> Option<String> {
        let (start, end, line_wise) = self.selection(parser)?;
        let mut out = String::new();
        if line_wise {
            for abs in start.0..=end.0 {
                if abs > start.0 {
                    out.push('\n');
                }
                out.push_str(&line_text(parser, abs).unwrap_or_default());
            }
            return Some(out);
        }
        for abs in start.0..=end.0 {
            if abs > start.0 {
                out.push('\n');
            }
            let Some(cells) = line_cells(parser, abs) else { continue };
            let from = if abs == start.0 { start.1 } else { 0 };
            let to = if abs == end.0 { end.1 } else { u16::MAX };
            let mut line = String::new();
            for (col, text) in &cells {
                if *col >= from && *col <= to {
                    line.push_str(text);
                }
            }
            out.push_str(line.trim_end());
        }
        Some(out)
    }

    // ─── Mouse selection ────────────────────────────────────────────────

    pub fn mouse_press(&mut self, parser: &mut vt100::Parser, x: u16, y: u16) {
        let (rows, cols) = parser.screen().size();
        self.cursor_x = x.min(cols.saturating_sub(1));
        self.cursor_y = y.min(rows.saturating_sub(1));
        let abs = self.abs_line(parser);
        self.state = CopyState::VisualChar;
        self.anchor = Some((abs, self.cursor_x));
    }

    pub fn mouse_drag(&mut self, parser: &mut vt100::Parser, x: u16, y: u16) {
        if self.state != CopyState::VisualChar {
            return;
        }
        let (rows, cols) = parser.screen().size();
        self.cursor_x = x.min(cols.saturating_sub(1));
        self.cursor_y = y.min(rows.saturating_sub(1));
    }
}

// ─── Character classification ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Space,
    Word,
    Punct,
}

fn classify(c: char, big: bool) -> CharClass {
    if c.is_whitespace() {
        CharClass::Space
    } else if big || c.is_alphanumeric() || c == '_' {
        CharClass::Word
    } else {
        CharClass::Punct
    }
}

fn class_at(parser: &mut vt100::Parser, pos: (usize, u16), big: bool) -> CharClass {
    let Some(cells) = line_cells(parser, pos.0) else { return CharClass::Space };
    let idx = cell_index_for_col(&cells, pos.1);
    match cells.get(idx).and_then(|(_, s)| s.chars().next()) {
        Some(c) => classify(c, big),
        None => CharClass::Space,
    }
}

fn cell_index_for_col(cells: &[(u16, String)], col: u16) -> usize {
    let mut idx = 0;
    for (i, (c, _)) in cells.iter().enumerate() {
        if *c > col {
            break;
        }
        idx = i;
    }
    idx
}

/// Advance one cell, wrapping to the next line.
fn step_forward(parser: &mut vt100::Parser, pos: (usize, u16)) -> Option<(usize, u16)> {
    let cells = line_cells(parser, pos.0)?;
    let idx = cell_index_for_col(&cells, pos.1);
    if idx + 1 < cells.len() {
        return Some((pos.0, cells[idx + 1].0));
    }
    if pos.0 + 1 < total_lines(parser) {
        Some((pos.0 + 1, 0))
    } else {
        None
    }
}

/// Step back one cell, wrapping to the previous line's last cell.
fn step_backward(parser: &mut vt100::Parser, pos: (usize, u16)) -> Option<(usize, u16)> {
    let cells = line_cells(parser, pos.0)?;
    let idx = cell_index_for_col(&cells, pos.1);
    if idx > 0 {
        return Some((pos.0, cells[idx - 1].0));
    }
    if pos.0 == 0 {
        return None;
    }
    let prev = line_cells(parser, pos.0 - 1)?;
    let last = prev.last().map(|(c, _)| *c).unwrap_or(0);
    Some((pos.0 - 1, last))
}

fn first_non_blank_col(parser: &mut vt100::Parser, abs: usize) -> Option<u16> {
    let cells = line_cells(parser, abs)?;
    cells
        .iter()
        .find(|(_, s)| !s.trim().is_empty())
        .map(|(c, _)| *c)
}

fn last_non_blank_col(parser: &mut vt100::Parser, abs: usize) -> Option<u16> {
    let cells = line_cells(parser, abs)?;
    cells
        .iter()
        .rev()
        .find(|(_, s)| !s.trim().is_empty())
        .map(|(c, _)| *c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser_with(lines: &[&str]) -> vt100::Parser {
        let mut p = vt100::Parser::new(5, 40, 100);
        for (i, l) in lines.iter().enumerate() {
            if i > 0 {
                p.process(b"\r\n");
            }
            p.process(l.as_bytes());
        }
        // Park the hardware cursor at the origin so entry is predictable.
        p.process(b"\x1b[H");
        p
    }

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn press(cm: &mut CopyMode, p: &mut vt100::Parser, keys: &str) -> CopyOutcome {
        let mut last = CopyOutcome::None;
        for c in keys.chars() {
            last = cm.handle_key(p, 0, key(c));
        }
        last
    }

    #[test]
    fn enter_exit_leaves_state_untouched() {
        let mut p = parser_with(&["hello"]);
        let mut cm = CopyMode::new(&p);
        assert_eq!(cm.state, CopyState::Normal);
        let out = cm.handle_key(&mut p, 0, key('q'));
        assert_eq!(out, CopyOutcome::Exit);
        assert_eq!(p.screen().scrollback(), 0);
    }

    #[test]
    fn search_jump_step_and_wrap() {
        // Scenario: lines "hello world" / "world hello" / "foo bar",
        // cursor at the origin.
        let mut p = parser_with(&["hello world", "world hello", "foo bar"]);
        let mut cm = CopyMode::new(&p);
        assert_eq!((cm.cursor_y, cm.cursor_x), (0, 0));
        cm.handle_key(&mut p, 0, key('/'));
        assert_eq!(cm.state, CopyState::Search);
        press(&mut cm, &mut p, "world");
        cm.handle_key(&mut p, 0, KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        assert_eq!(cm.state, CopyState::Normal);
        assert_eq!((cm.abs_line(&mut p), cm.cursor_x), (0, 6));
        cm.handle_key(&mut p, 0, key('n'));
        assert_eq!((cm.abs_line(&mut p), cm.cursor_x), (1, 0));
        cm.handle_key(&mut p, 0, key('n'));
        assert_eq!((cm.abs_line(&mut p), cm.cursor_x), (0, 6));
        // N walks back the other way.
        cm.handle_key(&mut p, 0, key('N'));
        assert_eq!((cm.abs_line(&mut p), cm.cursor_x), (1, 0));
    }

    #[test]
    fn backward_search_picks_last_match_before_cursor() {
        let mut p = parser_with(&["alpha", "beta", "alpha beta"]);
        let mut cm = CopyMode::new(&p);
        // Move to the last line first.
        cm.handle_key(&mut p, 0, key('G'));
        cm.handle_key(&mut p, 0, key('$'));
        cm.handle_key(&mut p, 0, key('?'));
        press(&mut cm, &mut p, "alpha");
        cm.handle_key(&mut p, 0, KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        assert_eq!((cm.abs_line(&mut p), cm.cursor_x), (2, 0));
    }

    #[test]
    fn bracket_match_round_trips() {
        // Scenario: "a (b (c) d) e", cursor on the first '(' at column 2.
        let mut p = parser_with(&["a (b (c) d) e"]);
        let mut cm = CopyMode::new(&p);
        cm.cursor_x = 2;
        cm.handle_key(&mut p, 0, key('%'));
        assert_eq!(cm.cursor_x, 10);
        cm.handle_key(&mut p, 0, key('%'));
        assert_eq!(cm.cursor_x, 2);
    }

    #[test]
    fn bracket_match_scans_to_first_bracket() {
        let mut p = parser_with(&["ab [x] cd"]);
        let mut cm = CopyMode::new(&p);
        cm.handle_key(&mut p, 0, key('%'));
        assert_eq!(cm.cursor_x, 5);
    }

    #[test]
    fn word_motions_walk_and_terminate() {
        let mut p = parser_with(&["foo bar-baz  qux"]);
        let mut cm = CopyMode::new(&p);
        cm.handle_key(&mut p, 0, key('w'));
        assert_eq!(cm.cursor_x, 4); // bar
        cm.handle_key(&mut p, 0, key('w'));
        assert_eq!(cm.cursor_x, 7); // -
        cm.handle_key(&mut p, 0, key('w'));
        assert_eq!(cm.cursor_x, 8); // baz
        cm.handle_key(&mut p, 0, key('W'));
        assert_eq!(cm.cursor_x, 13); // qux
        cm.handle_key(&mut p, 0, key('b'));
        assert_eq!(cm.cursor_x, 8);
        cm.handle_key(&mut p, 0, key('e'));
        assert_eq!(cm.cursor_x, 10); // end of baz
    }

    #[test]
    fn word_motion_survives_blank_document() {
        let mut p = parser_with(&["", "", ""]);
        let mut cm = CopyMode::new(&p);
        for _ in 0..5 {
            cm.handle_key(&mut p, 0, key('w'));
        }
        // No hang, cursor stays in bounds.
        assert!(cm.cursor_x < 40);
    }

    #[test]
    fn counts_apply_and_reset() {
        let mut p = parser_with(&["abcdefghij"]);
        let mut cm = CopyMode::new(&p);
        press(&mut cm, &mut p, "3l");
        assert_eq!(cm.cursor_x, 3);
        // Count was consumed; a bare l moves one.
        cm.handle_key(&mut p, 0, key('l'));
        assert_eq!(cm.cursor_x, 4);
    }

    #[test]
    fn zero_is_motion_without_count_and_digit_with() {
        let mut p = parser_with(&["abcdefghijklmnopqrst"]);
        let mut cm = CopyMode::new(&p);
        press(&mut cm, &mut p, "5l");
        assert_eq!(cm.cursor_x, 5);
        press(&mut cm, &mut p, "0");
        assert_eq!(cm.cursor_x, 0);
        press(&mut cm, &mut p, "1");
        press(&mut cm, &mut p, "0l");
        assert_eq!(cm.cursor_x, 10);
    }

    #[test]
    fn char_search_with_repeat_and_reverse() {
        let mut p = parser_with(&["a.b.c.d"]);
        let mut cm = CopyMode::new(&p);
        press(&mut cm, &mut p, "f.");
        assert_eq!(cm.cursor_x, 1);
        press(&mut cm, &mut p, ";");
        assert_eq!(cm.cursor_x, 3);
        press(&mut cm, &mut p, ",");
        assert_eq!(cm.cursor_x, 1);
        press(&mut cm, &mut p, "t.");
        assert_eq!(cm.cursor_x, 2);
    }

    #[test]
    fn dollar_and_caret_find_line_extents() {
        let mut p = parser_with(&["   mid text   "]);
        let mut cm = CopyMode::new(&p);
        press(&mut cm, &mut p, "$");
        assert_eq!(cm.cursor_x, 10);
        press(&mut cm, &mut p, "^");
        assert_eq!(cm.cursor_x, 3);
    }

    #[test]
    fn gg_and_capital_g_hit_document_ends() {
        let lines: Vec<String> = (0..20).map(|i| format!("line {i}")).collect();
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        let mut p = parser_with(&refs);
        let mut cm = CopyMode::new(&p);
        press(&mut cm, &mut p, "gg");
        assert_eq!(cm.abs_line(&mut p), 0);
        press(&mut cm, &mut p, "G");
        assert_eq!(cm.abs_line(&mut p), 19);
        press(&mut cm, &mut p, "5G");
        assert_eq!(cm.abs_line(&mut p), 4);
    }

    #[test]
    fn visual_char_yank_collects_span() {
        let mut p = parser_with(&["hello world"]);
        let mut cm = CopyMode::new(&p);
        press(&mut cm, &mut p, "v");
        press(&mut cm, &mut p, "4l");
        let out = press(&mut cm, &mut p, "y");
        assert_eq!(out, CopyOutcome::Yank("hello".to_string()));
        assert_eq!(cm.state, CopyState::Normal);
        assert!(cm.anchor.is_none());
    }

    #[test]
    fn visual_line_yank_spans_whole_lines() {
        let mut p = parser_with(&["first line", "second line", "third"]);
        let mut cm = CopyMode::new(&p);
        press(&mut cm, &mut p, "V");
        press(&mut cm, &mut p, "j");
        let out = press(&mut cm, &mut p, "y");
        assert_eq!(out, CopyOutcome::Yank("first line\nsecond line".to_string()));
    }

    #[test]
    fn visual_line_reversed_anchors_normalize() {
        let mut p = parser_with(&["  aa  ", "bb", "cc"]);
        let mut cm = CopyMode::new(&p);
        // Start on the "cc" line and sweep upward.
        press(&mut cm, &mut p, "3G");
        press(&mut cm, &mut p, "V");
        press(&mut cm, &mut p, "kk");
        let sel = cm.selection(&mut p).unwrap();
        assert!(sel.2);
        assert_eq!(sel.0 .0, 0);
        assert_eq!(sel.1 .0, 2);
        // Top bound lands on the first non-blank of "  aa  ".
        assert_eq!(sel.0 .1, 2);
    }

    #[test]
    fn escape_cancels_visual_before_exiting() {
        let mut p = parser_with(&["text"]);
        let mut cm = CopyMode::new(&p);
        press(&mut cm, &mut p, "v");
        let out = cm.handle_key(&mut p, 0, KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert_eq!(out, CopyOutcome::None);
        assert_eq!(cm.state, CopyState::Normal);
        let out = cm.handle_key(&mut p, 0, KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert_eq!(out, CopyOutcome::Exit);
    }

    #[test]
    fn cursor_centers_in_long_scrollback() {
        let lines: Vec<String> = (0..100).map(|i| format!("row {i}")).collect();
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        let mut p = parser_with(&refs);
        let mut cm = CopyMode::new(&p);
        cm.center_on(&mut p, 50);
        assert_eq!(cm.abs_line(&mut p), 50);
        // 5-row viewport: the cursor sits on the middle row.
        assert_eq!(cm.cursor_y, 2);
        // At the very top the cursor must leave the midpoint.
        cm.center_on(&mut p, 0);
        assert_eq!(cm.abs_line(&mut p), 0);
        assert_eq!(cm.cursor_y, 0);
    }

    #[test]
    fn paging_moves_half_and_full_screens() {
        let lines: Vec<String> = (0..50).map(|i| format!("row {i}")).collect();
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        let mut p = parser_with(&refs);
        let mut cm = CopyMode::new(&p);
        press(&mut cm, &mut p, "gg");
        let start = cm.abs_line(&mut p);
        cm.handle_key(&mut p, 0, ctrl('d'));
        assert_eq!(cm.abs_line(&mut p), start + 2);
        cm.handle_key(&mut p, 0, ctrl('f'));
        assert_eq!(cm.abs_line(&mut p), start + 7);
        cm.handle_key(&mut p, 0, ctrl('u'));
        assert_eq!(cm.abs_line(&mut p), start + 5);
    }

    #[test]
    fn paragraph_motion_stops_at_blank_lines() {
        let mut p = parser_with(&["one", "two", "", "three", "four"]);
        let mut cm = CopyMode::new(&p);
        press(&mut cm, &mut p, "gg");
        press(&mut cm, &mut p, "}");
        assert_eq!(cm.abs_line(&mut p), 2);
        press(&mut cm, &mut p, "}");
        assert_eq!(cm.abs_line(&mut p), 4);
        press(&mut cm, &mut p, "{");
        assert_eq!(cm.abs_line(&mut p), 2);
    }

    #[test]
    fn clearing_highlights_keeps_query_for_n() {
        let mut p = parser_with(&["aa aa aa"]);
        let mut cm = CopyMode::new(&p);
        cm.handle_key(&mut p, 0, key('/'));
        press(&mut cm, &mut p, "aa");
        cm.handle_key(&mut p, 0, KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        assert!(!cm.matches.is_empty());
        cm.handle_key(&mut p, 0, ctrl('l'));
        assert!(cm.matches.is_empty());
        cm.handle_key(&mut p, 0, key('n'));
        assert!(!cm.matches.is_empty());
    }
}
