//! Selections, tags, marks and the files they are persisted in.

use std::path::{Path, PathBuf};

use tracing::info;

use super::Navigator;
use crate::config::SelectionMode;
use crate::error::{AppError, AppResult};
use crate::model::matching::glob_match;
use crate::model::persistence::{self, CopyBuffer};
use crate::model::selection::{Marks, Tags};

impl Navigator {
    /// Toggle the selection of the entry under the cursor.
    pub fn toggle(&mut self) {
        if let Ok(curr) = self.curr_file() {
            let path: PathBuf = curr.path.clone();
            self.selections.toggle(&path);
        }
    }

    /// Toggle every displayed entry of the current directory.
    pub fn invert(&mut self) {
        let paths: Vec<PathBuf> = self
            .curr_dir()
            .map(|d| d.files().iter().map(|f| f.path.clone()).collect())
            .unwrap_or_default();

        for path in &paths {
            self.selections.toggle(path);
        }
    }

    pub fn unselect(&mut self) {
        self.selections.clear();
    }

    /// Select (or with `invert`, deselect) every displayed entry matching
    /// `pattern`. Matching nothing is an error.
    pub fn glob_sel(&mut self, pattern: &str, invert: bool) -> AppResult<()> {
        let mut matched: Vec<PathBuf> = Vec::new();
        if let Some(dir) = self.curr_dir() {
            for file in dir.files() {
                if glob_match(pattern, &file.name)? {
                    matched.push(file.path.clone());
                }
            }
        }

        if matched.is_empty() {
            return Err(AppError::PatternNotFound(pattern.to_string()));
        }

        for path in &matched {
            if self.selections.contains(path) == invert {
                self.selections.toggle(path);
            }
        }

        Ok(())
    }

    /// Selected paths in selection order, limited to the current directory
    /// when `selmode` is `dir`.
    pub fn curr_selections(&self) -> Vec<PathBuf> {
        match self.options.selmode {
            SelectionMode::All => self.selections.ordered(|_| true),
            SelectionMode::Dir => {
                let cwd: &Path = self.cwd();
                self.selections.ordered(|p: &Path| p.parent() == Some(cwd))
            }
        }
    }

    /// The selection, or the entry under the cursor when nothing is selected.
    pub fn curr_file_or_selections(&self) -> AppResult<Vec<PathBuf>> {
        let selected: Vec<PathBuf> = self.curr_selections();
        if !selected.is_empty() {
            return Ok(selected);
        }

        self.curr_file()
            .map(|f| vec![f.path.clone()])
            .map_err(|_| AppError::NoFileSelected)
    }

    // ------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------

    pub fn tag(&mut self, tag: &str) -> AppResult<()> {
        let list: Vec<PathBuf> = self.curr_file_or_selections()?;
        Tags::validate(tag)?;

        for path in list {
            self.tags.set(path, tag);
        }

        Ok(())
    }

    pub fn tag_toggle(&mut self, tag: &str) -> AppResult<()> {
        let list: Vec<PathBuf> = self.curr_file_or_selections()?;
        Tags::validate(tag)?;

        for path in &list {
            self.tags.toggle(path, tag);
        }

        Ok(())
    }

    // ------------------------------------------------------------
    // Marks
    // ------------------------------------------------------------

    /// Bookmark the current directory under `mark` and share it.
    pub async fn mark_save(&mut self, mark: char) -> AppResult<()> {
        self.marks.insert(mark, self.cwd().to_path_buf());
        self.write_marks().await?;
        self.broadcast_sync().await
    }

    /// Change to the directory bookmarked under `mark`.
    pub fn mark_load(&mut self, mark: char) -> AppResult<()> {
        let path: PathBuf = self
            .marks
            .get(&mark)
            .cloned()
            .ok_or(AppError::NoSuchMark(mark))?;

        self.cd_path(&path)?;
        self.jump_list.record(&path);

        Ok(())
    }

    pub async fn mark_remove(&mut self, mark: char) -> AppResult<()> {
        if self.marks.remove(&mark).is_none() {
            return Err(AppError::NoSuchMark(mark));
        }

        self.write_marks().await?;
        self.broadcast_sync().await
    }

    pub async fn read_marks(&mut self) -> AppResult<()> {
        self.marks = persistence::read_marks(&self.paths.marks).await?;
        Ok(())
    }

    pub async fn write_marks(&self) -> AppResult<()> {
        let options = &self.options;
        persistence::write_marks(&self.paths.marks, &self.marks, |c: char| options.is_temp_mark(c))
            .await
    }

    pub async fn read_tags(&mut self) -> AppResult<()> {
        let entries = persistence::read_tags(&self.paths.tags).await?;
        self.tags.replace(entries);
        Ok(())
    }

    pub async fn write_tags(&self) -> AppResult<()> {
        persistence::write_tags(&self.paths.tags, &self.tags).await
    }

    /// Re-read the copy buffer, marks and tags written by other sessions.
    /// Temporary marks only exist in memory and survive the reload.
    pub async fn sync(&mut self) -> AppResult<()> {
        let buffer: Option<CopyBuffer> = persistence::read_copy_buffer(&self.paths.files).await?;
        self.saves.clear();
        if let Some(buffer) = buffer {
            for path in buffer.paths {
                self.saves.insert(path, buffer.mode);
            }
        }

        let old_marks: Marks = std::mem::take(&mut self.marks);
        let marks_result: AppResult<()> = self.read_marks().await;
        for (mark, path) in old_marks {
            if self.options.is_temp_mark(mark) {
                self.marks.insert(mark, path);
            }
        }

        let tags_result: AppResult<()> = self.read_tags().await;

        info!(
            marker = "NAV_SYNC",
            operation_type = "sync",
            marks = self.marks.len(),
            tags = self.tags.len(),
            saves = self.saves.len(),
            "Shared state re-read"
        );

        marks_result.and(tags_result)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::controller::event_loop::EventLoop;
    use std::fs;
    use tempfile::TempDir;

    async fn nav_with(names: &[&str]) -> (TempDir, Navigator, EventLoop) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir(&root).unwrap();
        for name in names {
            fs::write(root.join(name), b"").unwrap();
        }

        let (mut nav, mut events) = Navigator::new(&config_in(temp_dir.path()), &root, 10).unwrap();
        settle(&mut nav, &mut events, loaded).await;
        (temp_dir, nav, events)
    }

    #[tokio::test]
    async fn test_glob_sel_and_invert() {
        let (temp_dir, mut nav, _events) = nav_with(&["a.rs", "b.rs", "c.md"]).await;
        let root = temp_dir.path().join("root");

        nav.glob_sel("*.rs", false).unwrap();
        assert_eq!(nav.curr_selections(), vec![root.join("a.rs"), root.join("b.rs")]);

        nav.glob_sel("a.*", true).unwrap();
        assert_eq!(nav.curr_selections(), vec![root.join("b.rs")]);

        match nav.glob_sel("*.txt", false) {
            Err(AppError::PatternNotFound(p)) => assert_eq!(p, "*.txt"),
            other => panic!("expected pattern not found, got {other:?}"),
        }

        nav.invert();
        assert_eq!(nav.curr_selections(), vec![root.join("a.rs"), root.join("c.md")]);

        nav.unselect();
        assert_eq!(nav.curr_file_or_selections().unwrap(), vec![root.join("a.rs")]);
    }

    #[tokio::test]
    async fn test_selmode_dir_scopes_selections() {
        let (temp_dir, mut nav, _events) = nav_with(&["x"]).await;
        let outside = temp_dir.path().join("elsewhere");

        nav.selections.toggle(&outside);
        nav.toggle();
        assert_eq!(nav.curr_selections().len(), 2);

        nav.options.selmode = SelectionMode::Dir;
        assert_eq!(nav.curr_selections(), vec![temp_dir.path().join("root/x")]);
    }

    #[tokio::test]
    async fn test_tags_need_single_width() {
        let (temp_dir, mut nav, _events) = nav_with(&["f"]).await;
        let f = temp_dir.path().join("root/f");

        assert!(nav.tag("ab").is_err());
        assert!(nav.tag("界").is_err());

        nav.tag("*").unwrap();
        assert_eq!(nav.tags.get(&f), Some("*"));
        nav.tag_toggle("*").unwrap();
        assert_eq!(nav.tags.get(&f), None);
    }

    #[tokio::test]
    async fn test_marks_persist_without_temp_marks() {
        let (temp_dir, mut nav, _events) = nav_with(&[]).await;
        let root = temp_dir.path().join("root");

        nav.mark_save('a').await.unwrap();
        nav.mark_save('\'').await.unwrap();

        let text = fs::read_to_string(temp_dir.path().join("data/marks")).unwrap();
        assert_eq!(text, format!("a:{}\n", root.display()));

        nav.cd("/").unwrap();
        nav.mark_load('a').unwrap();
        assert_eq!(nav.cwd(), root.as_path());

        match nav.mark_remove('z').await {
            Err(AppError::NoSuchMark('z')) => {}
            other => panic!("expected missing mark, got {other:?}"),
        }
        assert!(nav.mark_load('z').is_err());
    }

    #[tokio::test]
    async fn test_mark_load_keeps_non_utf8_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (temp_dir, mut nav, _events) = nav_with(&[]).await;
        let target = temp_dir.path().join(OsStr::from_bytes(b"caf\xe9"));
        fs::create_dir(&target).unwrap();

        nav.marks.insert('n', target.clone());
        nav.mark_load('n').unwrap();

        assert_eq!(nav.cwd(), target.as_path());
        assert_eq!(nav.jump_list.current(), Some(target.as_path()));
    }

    #[tokio::test]
    async fn test_sync_keeps_temp_marks_and_reads_tags() {
        let (temp_dir, mut nav, _events) = nav_with(&["f"]).await;
        let data = temp_dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("marks"), "b:/somewhere\n").unwrap();
        fs::write(data.join("tags"), "/x:y:z\n").unwrap();
        fs::write(data.join("files"), "move\n/p\n").unwrap();

        nav.marks.insert('\'', PathBuf::from("/tmp"));
        nav.marks.insert('a', PathBuf::from("/gone"));
        nav.sync().await.unwrap();

        assert_eq!(nav.marks.get(&'b'), Some(&PathBuf::from("/somewhere")));
        assert_eq!(nav.marks.get(&'\''), Some(&PathBuf::from("/tmp")));
        assert!(!nav.marks.contains_key(&'a'));
        assert_eq!(nav.tags.get(Path::new("/x:y")), Some("z"));
        assert_eq!(
            nav.saves.get(Path::new("/p")),
            Some(&crate::model::persistence::BufferMode::Move)
        );
    }
}
