//! src/model/viewport.rs
//! ============================================================================
//! # Cursor and viewport arithmetic
//!
//! `ind` is the cursor index into the displayed entries and `pos` the row the
//! cursor occupies in a viewport of `height` rows, so the first visible entry
//! is `ind - pos`. Scrolloff keeps context rows around the cursor and is
//! capped by half the height and by what is left at either end of the list.
//! Every movement reports whether `ind` changed.

use crate::model::directory::Directory;

/// Viewport geometry and the options that bound movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollParams {
    pub height: usize,
    pub scrolloff: usize,
    pub wrapscroll: bool,
}

impl ScrollParams {
    fn min_edge(&self) -> isize {
        (self.height / 2).min(self.scrolloff) as isize
    }
}

impl Directory {
    fn store(&mut self, ind: isize, pos: isize) {
        self.ind = ind.max(0) as usize;
        self.pos = pos.max(0) as usize;
    }

    fn last_index(&self) -> isize {
        self.len() as isize - 1
    }

    pub fn up(&mut self, dist: usize, sp: ScrollParams) -> bool {
        let old: usize = self.ind;

        if self.ind == 0 {
            if sp.wrapscroll {
                self.bottom(sp);
            }
            return old != self.ind;
        }

        let dist: isize = dist as isize;
        let ind: isize = (self.ind as isize - dist).max(0);
        let pos: isize = self.pos as isize - dist;
        let edge: isize = sp.min_edge().min(ind);

        self.store(ind, pos.max(edge));

        old != self.ind
    }

    pub fn down(&mut self, dist: usize, sp: ScrollParams) -> bool {
        let old: usize = self.ind;
        let maxind: isize = self.last_index();

        if self.ind as isize >= maxind {
            if sp.wrapscroll {
                self.top();
            }
            return old != self.ind;
        }

        let h: isize = sp.height as isize;
        let dist: isize = dist as isize;
        let ind: isize = (self.ind as isize + dist).min(maxind);
        let mut pos: isize = self.pos as isize + dist;

        // an even height with maxed scrolloff keeps the cursor on the same row
        let edge: isize = sp
            .min_edge()
            .min(maxind - ind)
            .min(h / 2 + h % 2 - 1);

        pos = pos.min(h - edge - 1).min(maxind);
        self.store(ind, pos);

        old != self.ind
    }

    /// Move the viewport up; the cursor follows only to keep its context rows.
    pub fn scroll_up(&mut self, dist: usize, sp: ScrollParams) -> bool {
        if self.ind == self.pos {
            return false;
        }

        let old: usize = self.ind;
        let h: isize = sp.height as isize;
        let minedge: isize = sp.min_edge();
        let beg: isize = (self.ind - self.pos) as isize;
        let dist: isize = (dist as isize).min(beg);

        let mut pos: isize = self.pos as isize + dist;
        let delta: isize = (h - pos - minedge - 1).min(0);
        pos = pos.min(h - minedge - 1).min(h - 1);
        let ind: isize = self.ind as isize + delta;

        self.store(ind, pos);

        old != self.ind
    }

    /// Move the viewport down; the cursor follows only to keep its context rows.
    pub fn scroll_down(&mut self, dist: usize, sp: ScrollParams) -> bool {
        let maxind: isize = self.last_index();
        let h: isize = sp.height as isize;
        let beg: isize = (self.ind - self.pos) as isize;

        if beg > maxind - h {
            return false;
        }

        let old: usize = self.ind;
        let minedge: isize = sp.min_edge();
        let dist: isize = (dist as isize).min(maxind - h + 1 - beg);

        let mut pos: isize = self.pos as isize - dist;
        let delta: isize = (pos - minedge).min(0);
        pos = pos.max(minedge);
        let ind: isize = (self.ind as isize - delta).min(maxind);

        self.store(ind, pos);

        old != self.ind
    }

    pub fn top(&mut self) -> bool {
        let old: usize = self.ind;
        self.ind = 0;
        self.pos = 0;

        old != self.ind
    }

    pub fn bottom(&mut self, sp: ScrollParams) -> bool {
        let old: usize = self.ind;
        if self.is_empty() {
            return self.top();
        }

        self.ind = self.len() - 1;
        self.pos = self.ind.min(sp.height.saturating_sub(1));

        old != self.ind
    }

    /// Jump to the first row of the viewport, keeping scrolloff unless at the top.
    pub fn high(&mut self, sp: ScrollParams) -> bool {
        if self.is_empty() {
            return false;
        }

        let old: usize = self.ind;
        let beg: usize = self.ind - self.pos;
        let offs: usize = if beg == 0 { 0 } else { sp.scrolloff };

        self.ind = (beg + offs).min(self.len() - 1);
        self.pos = self.ind - beg;

        old != self.ind
    }

    pub fn middle(&mut self, sp: ScrollParams) -> bool {
        if self.is_empty() {
            return false;
        }

        let old: usize = self.ind;
        let beg: usize = self.ind - self.pos;
        let end: usize = (beg + sp.height).min(self.len());
        let half: usize = (end - beg) / 2;

        self.ind = beg + half;
        self.pos = half;

        old != self.ind
    }

    /// Jump to the last row of the viewport, keeping scrolloff unless at the end.
    pub fn low(&mut self, sp: ScrollParams) -> bool {
        if self.is_empty() {
            return false;
        }

        let old: usize = self.ind;
        let beg: usize = self.ind - self.pos;
        let end: usize = (beg + sp.height).min(self.len());
        let offs: usize = if end == self.len() { 0 } else { sp.scrolloff };
        let offs: usize = offs.min(end - beg - 1);

        self.ind = end - 1 - offs;
        self.pos = end - beg - 1 - offs;

        old != self.ind
    }
}
