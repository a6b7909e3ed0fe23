//! Cursor movement, directory changes, find and search.

use std::{
    fs::Metadata,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use super::Navigator;
use crate::error::{AppError, AppResult};
use crate::fs::file_info::FileInfo;
use crate::model::directory::Directory;
use crate::model::matching::{find_match, search_match};
use crate::model::viewport::ScrollParams;
use crate::util::paths::{base_name, resolve};

impl Navigator {
    fn move_cursor(&mut self, f: impl FnOnce(&mut Directory, ScrollParams) -> bool) -> bool {
        let sp: ScrollParams = self.scroll_params();
        match self.curr_dir_mut() {
            Some(dir) => f(dir, sp),
            None => false,
        }
    }

    pub fn up(&mut self, dist: usize) -> bool {
        self.move_cursor(|d, sp| d.up(dist, sp))
    }

    pub fn down(&mut self, dist: usize) -> bool {
        self.move_cursor(|d, sp| d.down(dist, sp))
    }

    pub fn page_up(&mut self) -> bool {
        self.up(self.height)
    }

    pub fn page_down(&mut self) -> bool {
        self.down(self.height)
    }

    pub fn half_up(&mut self) -> bool {
        self.up(self.height / 2)
    }

    pub fn half_down(&mut self) -> bool {
        self.down(self.height / 2)
    }

    pub fn scroll_up(&mut self, dist: usize) -> bool {
        self.move_cursor(|d, sp| d.scroll_up(dist, sp))
    }

    pub fn scroll_down(&mut self, dist: usize) -> bool {
        self.move_cursor(|d, sp| d.scroll_down(dist, sp))
    }

    pub fn top(&mut self) -> bool {
        self.move_cursor(|d, _| d.top())
    }

    pub fn bottom(&mut self) -> bool {
        self.move_cursor(|d, sp| d.bottom(sp))
    }

    pub fn high(&mut self) -> bool {
        self.move_cursor(|d, sp| d.high(sp))
    }

    pub fn middle(&mut self) -> bool {
        self.move_cursor(|d, sp| d.middle(sp))
    }

    pub fn low(&mut self) -> bool {
        self.move_cursor(|d, sp| d.low(sp))
    }

    /// Move to displayed index `target`, reporting whether the cursor moved.
    fn move_to(&mut self, target: usize) -> bool {
        let Some(ind) = self.curr_dir().map(|d: &Directory| d.ind) else {
            return false;
        };

        if target > ind {
            self.down(target - ind)
        } else {
            self.up(ind - target)
        }
    }

    // ------------------------------------------------------------
    // Directory changes
    // ------------------------------------------------------------

    /// Descend into the entry under the cursor.
    pub fn open(&mut self) -> AppResult<()> {
        let curr: Arc<FileInfo> = Arc::clone(self.curr_file()?);
        if !curr.is_dir {
            return Err(AppError::navigation_failed(&curr.path, "not a directory"));
        }

        self.load_dir(&curr.path);
        self.dirs.push(curr.path.clone());

        Ok(())
    }

    /// Pop one breadcrumb; nothing happens at the top of the stack.
    pub fn updir(&mut self) {
        if self.dirs.len() > 1 {
            self.dirs.pop();
        }
    }

    /// Change to `input`, resolved against the current directory, and
    /// record the visit in the jump list.
    pub fn cd(&mut self, input: &str) -> AppResult<()> {
        let wd: PathBuf = resolve(input, self.cwd());
        self.cd_path(&wd)?;
        self.jump_list.record(&wd);

        Ok(())
    }

    pub(super) fn cd_path(&mut self, wd: &Path) -> AppResult<()> {
        let meta: Metadata =
            std::fs::metadata(wd).map_err(|e| AppError::navigation_failed(wd, e.to_string()))?;
        if !meta.is_dir() {
            return Err(AppError::navigation_failed(wd, "not a directory"));
        }
        std::fs::read_dir(wd).map_err(|e| AppError::navigation_failed(wd, e.to_string()))?;

        debug!(
            marker = "NAV_CD",
            operation_type = "cd",
            path = %wd.display(),
            "Changing directory"
        );

        self.get_dirs(wd);

        Ok(())
    }

    /// Change to the parent of `input` and put the cursor on it. While the
    /// parent is still loading the entry is shown provisionally.
    pub fn select(&mut self, input: &str) -> AppResult<()> {
        let path: PathBuf = resolve(input, self.cwd());
        let lstat: Metadata = std::fs::symlink_metadata(&path)
            .map_err(|e| AppError::navigation_failed(&path, e.to_string()))?;

        let parent: PathBuf = path.parent().map_or_else(|| path.clone(), Path::to_path_buf);
        self.cd_path(&parent)?;
        self.jump_list.record(&parent);

        let name: String = base_name(&path);
        let (height, scrolloff) = (self.height, self.options.scrolloff);
        if let Some(dir) = self.curr_dir_mut() {
            if dir.loading && dir.position_of(&name).is_none() {
                dir.push_provisional(FileInfo::from_metadata(&path, &lstat));
            }
            dir.sel(&name, height, scrolloff);
        }

        Ok(())
    }

    /// Rename `old` to `new` and put the cursor on the new name.
    pub async fn rename(&mut self, old: &Path, new: &Path) -> AppResult<()> {
        self.fs
            .rename(old, new)
            .await
            .map_err(|e| AppError::file_operation_failed("rename", old, e.to_string()))?;

        let lstat: Metadata = self
            .fs
            .lstat(new)
            .await
            .map_err(|e| AppError::from_io_at(new, e))?;

        let parent: &Path = new.parent().unwrap_or(new);
        self.load_dir(parent);

        let name: String = base_name(new);
        let (height, scrolloff) = (self.height, self.options.scrolloff);
        if let Some(dir) = self.dir_cache.get_mut(parent) {
            if dir.loading {
                dir.push_provisional(FileInfo::from_metadata(new, &lstat));
            }
            dir.sel(&name, height, scrolloff);
        }

        Ok(())
    }

    /// Step back in the jump list.
    pub fn jump_prev(&mut self) -> AppResult<()> {
        match self.jump_list.prev().map(Path::to_path_buf) {
            Some(path) => self.cd_path(&path),
            None => Ok(()),
        }
    }

    /// Step forward in the jump list.
    pub fn jump_next(&mut self) -> AppResult<()> {
        match self.jump_list.next().map(Path::to_path_buf) {
            Some(path) => self.cd_path(&path),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------
    // Find and search
    // ------------------------------------------------------------

    fn displayed_names(&self) -> (Vec<String>, usize) {
        match self.curr_dir() {
            Some(dir) => (
                dir.files().iter().map(|f| f.name.to_string()).collect(),
                dir.ind,
            ),
            None => (Vec::new(), 0),
        }
    }

    /// First index after the cursor accepted by `hit`, wrapping to the
    /// start when `wrapscan` is on.
    fn scan_forward<E>(
        &self,
        mut hit: impl FnMut(&str) -> Result<bool, E>,
    ) -> Result<Option<usize>, E> {
        let (names, ind) = self.displayed_names();

        for (i, name) in names.iter().enumerate().skip(ind + 1) {
            if hit(name)? {
                return Ok(Some(i));
            }
        }
        if self.options.wrapscan {
            for (i, name) in names.iter().enumerate().take(ind) {
                if hit(name)? {
                    return Ok(Some(i));
                }
            }
        }

        Ok(None)
    }

    fn scan_backward<E>(
        &self,
        mut hit: impl FnMut(&str) -> Result<bool, E>,
    ) -> Result<Option<usize>, E> {
        let (names, ind) = self.displayed_names();

        for i in (0..ind.min(names.len())).rev() {
            if hit(&names[i])? {
                return Ok(Some(i));
            }
        }
        if self.options.wrapscan {
            for i in (ind + 1..names.len()).rev() {
                if hit(&names[i])? {
                    return Ok(Some(i));
                }
            }
        }

        Ok(None)
    }

    /// Set the find pattern and jump to the next match in its direction.
    /// Returns (cursor moved, match found).
    pub fn find(&mut self, pattern: &str, backward: bool) -> (bool, bool) {
        self.find = pattern.to_string();
        self.find_backward = backward;

        if backward { self.find_prev() } else { self.find_next() }
    }

    pub fn find_next(&mut self) -> (bool, bool) {
        let (pattern, opts) = (self.find.clone(), self.options.match_options());
        let found: Option<usize> = self
            .scan_forward(|n| Ok::<bool, AppError>(find_match(n, &pattern, &opts)))
            .unwrap_or(None);

        match found {
            Some(i) => (self.move_to(i), true),
            None => (false, false),
        }
    }

    pub fn find_prev(&mut self) -> (bool, bool) {
        let (pattern, opts) = (self.find.clone(), self.options.match_options());
        let found: Option<usize> = self
            .scan_backward(|n| Ok::<bool, AppError>(find_match(n, &pattern, &opts)))
            .unwrap_or(None);

        match found {
            Some(i) => (self.move_to(i), true),
            None => (false, false),
        }
    }

    /// Count matches of the find pattern; with exactly one, jump to it.
    pub fn find_single(&mut self) -> usize {
        let (names, _) = self.displayed_names();
        let opts = self.options.match_options();

        let mut count: usize = 0;
        let mut index: usize = 0;
        for (i, name) in names.iter().enumerate() {
            if find_match(name, &self.find, &opts) {
                count += 1;
                if count > 1 {
                    return count;
                }
                index = i;
            }
        }

        if count == 1 {
            self.move_to(index);
        }

        count
    }

    /// Set the search pattern and jump to the next match in its direction.
    pub fn search(&mut self, pattern: &str, backward: bool) -> AppResult<bool> {
        self.search = pattern.to_string();
        self.search_backward = backward;

        if backward { self.search_prev() } else { self.search_next() }
    }

    pub fn search_next(&mut self) -> AppResult<bool> {
        let (pattern, opts) = (self.search.clone(), self.options.match_options());
        match self.scan_forward(|n| search_match(n, &pattern, &opts))? {
            Some(i) => Ok(self.move_to(i)),
            None => Ok(false),
        }
    }

    pub fn search_prev(&mut self) -> AppResult<bool> {
        let (pattern, opts) = (self.search.clone(), self.options.match_options());
        match self.scan_backward(|n| search_match(n, &pattern, &opts))? {
            Some(i) => Ok(self.move_to(i)),
            None => Ok(false),
        }
    }
}
