use std::{
    convert::TryInto,
    io::{self, Read},
    time::SystemTime,
};

use rusqlite::{blob::ZeroBlob, params, DatabaseName, OptionalExtension};

use crate::{error::Error, sql, Changeset, FileRevisionCommit, Metadata, PatchSet, RunState, Symbol, ID};

#[derive(Debug)]
pub struct Connection {
    pub(crate) conn: rusqlite::Connection,
}

impl Connection {
    pub(crate) fn new(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn get_file_revisions<F, E>(&mut self, mut f: F) -> Result<(), Box<dyn std::error::Error>>
    where
        E: std::error::Error + 'static,
        F: FnMut(FileRevisionCommit) -> Result<(), E>,
    {
        let mut file_revision_stmt = self.conn.prepare_cached(
            "
            SELECT
                id,
                path,
                revision,
                mark,
                author,
                message,
                time,
                time_raw
            FROM
                file_revision_commits
            ",
        )?;

        let mut branch_stmt = self.conn.prepare_cached(
            "
            SELECT
                branch
            FROM
                file_revision_commit_branches
            WHERE
                file_revision_commit_id = ?
            ",
        )?;

        let mut rows = file_revision_stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id = row.get(0)?;
            let branches: Result<Vec<Vec<u8>>, rusqlite::Error> =
                branch_stmt.query_map([id], |row| row.get(0))?.collect();

            f(FileRevisionCommit {
                id,
                path: row.get(1)?,
                revision: row.get(2)?,
                mark: row.get(3)?,
                author: row.get(4)?,
                message: row.get(5)?,
                time: sql::into_time(row.get(6)?),
                time_raw: sql::into_time(row.get(7)?),
                branches: branches?,
            })?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_file_revision_commit<I>(
        &mut self,
        path: &[u8],
        revision: &[u8],
        mark: Option<usize>,
        author: &str,
        message: &str,
        time: &SystemTime,
        time_raw: &SystemTime,
        branches: I,
    ) -> Result<ID, Error>
    where
        I: Iterator,
        I::Item: AsRef<[u8]>,
    {
        let id = self
            .conn
            .prepare_cached(
                "
                INSERT INTO
                    file_revision_commits
                (path, revision, mark, author, message, time, time_raw)
                VALUES
                (?, ?, ?, ?, ?, ?, ?)
                ",
            )?
            .insert(params![
                path,
                revision,
                mark,
                author,
                message,
                sql::from_time(time),
                sql::from_time(time_raw),
            ])?;

        let mut stmt = self.conn.prepare_cached(
            "
            INSERT INTO
                file_revision_commit_branches
            (file_revision_commit_id, branch)
            VALUES
            (?, ?)
            ",
        )?;
        for branch in branches {
            stmt.execute(params![id, branch.as_ref()])?;
        }

        Ok(id)
    }

    pub fn get_patchsets<F, E>(&mut self, mut f: F) -> Result<(), Box<dyn std::error::Error>>
    where
        E: std::error::Error + 'static,
        F: FnMut(PatchSet) -> Result<(), E>,
    {
        let mut patchset_stmt = self.conn.prepare_cached(
            "
            SELECT
                id,
                mark,
                branch,
                time
            FROM
                patchsets
          ",
        )?;

        let mut file_revision_stmt = self.conn.prepare_cached(
            "
            SELECT
                file_revision_commit_id
            FROM
                file_revision_commit_patchsets
            WHERE
                patchset_id = ?
            ",
        )?;

        let mut rows = patchset_stmt.query([])?;
        while let Some(row) = rows.next()? {
            let patchset_id = row.get(0)?;
            let file_revisions: Result<Vec<ID>, rusqlite::Error> = file_revision_stmt
                .query_map([patchset_id], |row| row.get(0))?
                .collect();

            f(PatchSet {
                id: patchset_id,
                mark: row.get(1)?,
                branch: row.get(2)?,
                time: sql::into_time(row.get(3)?),
                file_revisions: file_revisions?,
            })?;
        }

        Ok(())
    }

    pub fn insert_patchset<I>(
        &mut self,
        mark: usize,
        branch: &[u8],
        time: &SystemTime,
        file_revision_commits: I,
    ) -> Result<ID, Error>
    where
        I: Iterator<Item = ID>,
    {
        let patchset_id = self
            .conn
            .prepare_cached("INSERT INTO patchsets (mark, branch, time) VALUES (?, ?, ?)")?
            .insert(params![mark, branch, sql::from_time(time)])?;

        let mut stmt = self.conn.prepare(
            "
            INSERT INTO
                file_revision_commit_patchsets
            (file_revision_commit_id, patchset_id)
            VALUES
            (?, ?)
            ",
        )?;
        for id in file_revision_commits {
            stmt.execute(params![id, patchset_id])?;
        }

        Ok(patchset_id)
    }

    pub fn get_tags<F, E>(&mut self, mut f: F) -> Result<(), Box<dyn std::error::Error>>
    where
        E: std::error::Error + 'static,
        F: FnMut(Vec<u8>, Vec<ID>) -> Result<(), E>,
    {
        let mut stmt = self.conn.prepare_cached(
            "
        SELECT
            id,
            tag,
            file_revision_commit_id
        FROM
            tags
        ORDER BY
            tag
        ",
        )?;

        let mut current_tag: Option<(Vec<u8>, Vec<ID>)> = None;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let tag_name = row.get(1)?;
            let id = row.get(2)?;

            match current_tag.take() {
                Some((current_tag_name, mut ids)) if current_tag_name == tag_name => {
                    ids.push(id);
                    current_tag = Some((current_tag_name, ids));
                }
                Some((current_tag_name, ids)) => {
                    f(current_tag_name, ids)?;
                    current_tag = Some((tag_name, vec![id]));
                }
                None => {
                    current_tag = Some((tag_name, vec![id]));
                }
            }
        }

        if let Some((tag_name, ids)) = current_tag.take() {
            f(tag_name, ids)?;
        }

        Ok(())
    }

    pub fn insert_tag<I>(&mut self, tag: &[u8], file_revision_commits: I) -> Result<(), Error>
    where
        I: Iterator<Item = ID>,
    {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO tags (tag, file_revision_commit_id) VALUES (?, ?)")?;
        for id in file_revision_commits {
            stmt.execute(params![tag, id])?;
        }

        Ok(())
    }

    pub fn get_raw_marks(&mut self) -> Result<Option<impl Read + '_>, Error> {
        Ok(
            if let Some(row_id) = self
                .conn
                .query_row::<i64, _, _>("SELECT ROWID FROM marks", [], |row| row.get(0))
                .optional()?
            {
                Some(
                    self.conn
                        .blob_open(DatabaseName::Main, "marks", "raw", row_id, true)?,
                )
            } else {
                None
            },
        )
    }

    pub fn set_raw_marks<R: Read>(&mut self, mut reader: R, size: usize) -> Result<(), Error> {
        // Blobs can only be up to 2^31-1 bytes in size in SQLite, so rusqlite
        // sensibly requires an i32. However, we're pretty much always going to
        // think about lengths as usize outside of this function, so let's do
        // the conversion here.
        //
        // A possible enhancement would be to split the mark file across
        // multiple records if needed.
        let blob_size = match size.try_into() {
            Ok(size) => size,
            Err(_) => {
                return Err(Error::LargeMarkFile {
                    max: i32::MAX,
                    size,
                });
            }
        };

        let txn = self.conn.transaction()?;

        txn.execute("DELETE FROM marks", [])?;
        let row_id: i64 = txn.query_row(
            "INSERT INTO marks (raw) VALUES (?) RETURNING ROWID",
            [ZeroBlob(blob_size)],
            |row| row.get(0),
        )?;

        let mut blob = txn.blob_open(DatabaseName::Main, "marks", "raw", row_id, false)?;
        io::copy(&mut reader, &mut blob)?;
        drop(blob);

        Ok(txn.commit()?)
    }

    pub fn insert_symbol(
        &mut self,
        name: &[u8],
        kind: &str,
        branch_votes: i64,
        tag_votes: i64,
        conflicted: bool,
        preferred_parent_lod: Option<&[u8]>,
    ) -> Result<ID, Error> {
        Ok(self
            .conn
            .prepare_cached(
                "
                INSERT INTO
                    symbols
                (name, kind, branch_votes, tag_votes, conflicted, preferred_parent_lod)
                VALUES
                (?, ?, ?, ?, ?, ?)
                ",
            )?
            .insert(params![
                name,
                kind,
                branch_votes,
                tag_votes,
                conflicted,
                preferred_parent_lod,
            ])?)
    }

    pub fn get_symbols<F, E>(&mut self, mut f: F) -> Result<(), Box<dyn std::error::Error>>
    where
        E: std::error::Error + 'static,
        F: FnMut(Symbol) -> Result<(), E>,
    {
        let mut stmt = self.conn.prepare_cached(
            "
            SELECT
                id, name, kind, branch_votes, tag_votes, conflicted, preferred_parent_lod
            FROM
                symbols
            ",
        )?;

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            f(Symbol {
                id: row.get(0)?,
                name: row.get(1)?,
                kind: row.get(2)?,
                branch_votes: row.get(3)?,
                tag_votes: row.get(4)?,
                conflicted: row.get(5)?,
                preferred_parent_lod: row.get(6)?,
            })?;
        }

        Ok(())
    }

    pub fn insert_metadata(&mut self, author: &str, message: &str) -> Result<ID, Error> {
        Ok(self
            .conn
            .prepare_cached("INSERT INTO changeset_metadata (author, message) VALUES (?, ?)")?
            .insert(params![author, message])?)
    }

    pub fn get_metadata_entries<F, E>(&mut self, mut f: F) -> Result<(), Box<dyn std::error::Error>>
    where
        E: std::error::Error + 'static,
        F: FnMut(Metadata) -> Result<(), E>,
    {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, author, message FROM changeset_metadata")?;

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            f(Metadata {
                id: row.get(0)?,
                author: row.get(1)?,
                message: row.get(2)?,
            })?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_changeset<I>(
        &mut self,
        kind: &str,
        lod: &[u8],
        symbol_id: Option<ID>,
        metadata_id: Option<ID>,
        time: &SystemTime,
        file_revision_commits: I,
    ) -> Result<ID, Error>
    where
        I: Iterator<Item = ID>,
    {
        let id = self
            .conn
            .prepare_cached(
                "INSERT INTO changesets (kind, lod, symbol_id, metadata_id, time) VALUES (?, ?, ?, ?, ?)",
            )?
            .insert(params![kind, lod, symbol_id, metadata_id, sql::from_time(time)])?;

        let mut stmt = self.conn.prepare(
            "INSERT INTO changeset_file_revisions (changeset_id, file_revision_commit_id) VALUES (?, ?)",
        )?;
        for file_revision_id in file_revision_commits {
            stmt.execute(params![id, file_revision_id])?;
        }

        Ok(id)
    }

    /// Records a changeset's predecessor edges. Split out from
    /// [`Connection::insert_changeset`] because a split changeset's
    /// predecessor list can reference a changeset created later in
    /// insertion order, so all changesets must exist before any edges are
    /// written.
    pub fn insert_changeset_predecessors<P>(&mut self, changeset_id: ID, predecessors: P) -> Result<(), Error>
    where
        P: Iterator<Item = ID>,
    {
        let mut stmt = self
            .conn
            .prepare("INSERT INTO changeset_predecessors (changeset_id, predecessor_id) VALUES (?, ?)")?;
        for predecessor_id in predecessors {
            stmt.execute(params![changeset_id, predecessor_id])?;
        }

        Ok(())
    }

    pub fn insert_changeset_file_predecessors<FP>(
        &mut self,
        changeset_id: ID,
        file_predecessors: FP,
    ) -> Result<(), Error>
    where
        FP: Iterator<Item = (ID, ID)>,
    {
        let mut stmt = self.conn.prepare(
            "
            INSERT INTO
                changeset_file_predecessors
            (changeset_id, file_revision_commit_id, predecessor_changeset_id)
            VALUES
            (?, ?, ?)
            ",
        )?;
        for (file_revision_id, predecessor_changeset_id) in file_predecessors {
            stmt.execute(params![changeset_id, file_revision_id, predecessor_changeset_id])?;
        }

        Ok(())
    }

    pub fn set_ordered_changeset(&mut self, changeset_id: ID, sequence_index: i64) -> Result<(), Error> {
        self.conn.prepare_cached(
            "INSERT INTO ordered_changesets (changeset_id, sequence_index) VALUES (?, ?)",
        )?
        .execute(params![changeset_id, sequence_index])?;

        Ok(())
    }

    pub fn get_changesets<F, E>(&mut self, mut f: F) -> Result<(), Box<dyn std::error::Error>>
    where
        E: std::error::Error + 'static,
        F: FnMut(Changeset) -> Result<(), E>,
    {
        // Creation order, not commit order: the latter is recorded
        // separately in `ordered_changesets` and read back via
        // `get_ordered_changeset_ids`, so the in-memory store's
        // `ChangesetId`s (assigned by re-insertion order here) keep
        // matching the IDs that order list references.
        let mut changeset_stmt = self.conn.prepare_cached(
            "
            SELECT
                id, kind, lod, symbol_id, metadata_id, time
            FROM
                changesets
            ORDER BY
                id ASC
            ",
        )?;

        let mut file_revision_stmt = self.conn.prepare_cached(
            "SELECT file_revision_commit_id FROM changeset_file_revisions WHERE changeset_id = ?",
        )?;

        let mut predecessor_stmt = self
            .conn
            .prepare_cached("SELECT predecessor_id FROM changeset_predecessors WHERE changeset_id = ?")?;

        let mut file_predecessor_stmt = self.conn.prepare_cached(
            "
            SELECT
                file_revision_commit_id, predecessor_changeset_id
            FROM
                changeset_file_predecessors
            WHERE
                changeset_id = ?
            ",
        )?;

        let mut rows = changeset_stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id = row.get(0)?;
            let file_revisions: Result<Vec<ID>, rusqlite::Error> = file_revision_stmt
                .query_map([id], |row| row.get(0))?
                .collect();
            let predecessors: Result<Vec<ID>, rusqlite::Error> = predecessor_stmt
                .query_map([id], |row| row.get(0))?
                .collect();
            let file_predecessors: Result<Vec<(ID, ID)>, rusqlite::Error> = file_predecessor_stmt
                .query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect();

            f(Changeset {
                id,
                kind: row.get(1)?,
                lod: row.get(2)?,
                symbol_id: row.get(3)?,
                metadata_id: row.get(4)?,
                time: sql::into_time(row.get(5)?),
                file_revisions: file_revisions?,
                predecessors: predecessors?,
                file_predecessors: file_predecessors?,
            })?;
        }

        Ok(())
    }

    /// Deletes every row from every table this connection manages. Called
    /// at the start of a full-state persist so the run-scoped ID mapping
    /// between in-memory stores and autoincrement SQL IDs (`sql_id =
    /// state_id + 1`) stays valid across repeated persists to the same
    /// database file, instead of accumulating duplicate rows.
    pub fn clear_all(&mut self) -> Result<(), Error> {
        let txn = self.conn.transaction()?;
        for table in [
            "changeset_file_predecessors",
            "changeset_predecessors",
            "ordered_changesets",
            "changeset_file_revisions",
            "changesets",
            "changeset_metadata",
            "symbols",
            "file_revision_commit_patchsets",
            "patchsets",
            "tags",
            "file_revision_commit_branches",
            "file_revision_commits",
        ] {
            txn.execute(&format!("DELETE FROM {}", table), [])?;
        }
        txn.commit()?;

        Ok(())
    }

    /// Reads back the final commit order the graph pass assigned, as
    /// changeset SQL IDs in sequence order.
    pub fn get_ordered_changeset_ids(&mut self) -> Result<Vec<ID>, Error> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT changeset_id FROM ordered_changesets ORDER BY sequence_index ASC")?;
        let ids: Result<Vec<ID>, rusqlite::Error> = stmt.query_map([], |row| row.get(0))?.collect();
        Ok(ids?)
    }

    pub fn get_run_state(&mut self) -> Result<Option<RunState>, Error> {
        Ok(self
            .conn
            .query_row(
                "SELECT last_completed_pass, schema_version FROM run_state WHERE id = 0",
                [],
                |row| {
                    Ok(RunState {
                        last_completed_pass: row.get(0)?,
                        schema_version: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn set_run_state(&mut self, run_state: &RunState) -> Result<(), Error> {
        self.conn.execute(
            "
            REPLACE INTO run_state (id, last_completed_pass, schema_version)
            VALUES (0, ?, ?)
            ",
            params![run_state.last_completed_pass, run_state.schema_version],
        )?;

        Ok(())
    }
}
