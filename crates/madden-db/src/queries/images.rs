//! Image file CRUD operations.

use madden_core::{Error, ImageFile, ImageFileId, NewImageFile, Page, Result};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::error;
use crate::models::{image_file_from_row, now};

const COLS: &str = "id, filename, thumbnail";

fn duplicate_filename(filename: &str) -> Error {
    Error::conflict(format!("image file with filename {filename} already exists"))
}

fn filename_taken(conn: &Connection, filename: &str, except: Option<ImageFileId>) -> Result<bool> {
    let except = except.map(|id| id.to_string());
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM image_files
         WHERE filename = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR id != ?2)",
        rusqlite::params![filename, except],
        |row| row.get(0),
    )
    .map_err(error::storage("failed to check image filename"))
}

/// Create a new image file record.
///
/// Returns [`Error::Conflict`] when a live file already has the filename.
/// The partial unique index on `filename` backs the pre-check, so a
/// concurrent insert of the same name fails the same way.
pub fn create_image_file(conn: &Connection, file: &NewImageFile) -> Result<ImageFile> {
    if filename_taken(conn, &file.filename, None)? {
        tracing::warn!(filename = %file.filename, "Rejected duplicate image filename");
        return Err(duplicate_filename(&file.filename));
    }

    let id = ImageFileId::new();
    let ts = now();
    conn.execute(
        "INSERT INTO image_files (id, filename, thumbnail, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        rusqlite::params![id.to_string(), file.filename, file.thumbnail, ts],
    )
    .map_err(|e| {
        if error::is_unique_violation(&e) {
            tracing::warn!(filename = %file.filename, "Lost image filename race");
            duplicate_filename(&file.filename)
        } else {
            Error::storage("failed to insert image file", e)
        }
    })?;

    tracing::debug!(%id, filename = %file.filename, "Created image file");
    Ok(ImageFile {
        id,
        filename: file.filename.clone(),
        thumbnail: file.thumbnail.clone(),
    })
}

/// Get an image file by ID.
pub fn get_image_file(conn: &Connection, id: ImageFileId) -> Result<Option<ImageFile>> {
    conn.query_row(
        &format!("SELECT {COLS} FROM image_files WHERE id = ?1 AND deleted_at IS NULL"),
        [id.to_string()],
        image_file_from_row,
    )
    .optional()
    .map_err(error::storage("failed to get image file"))
}

/// Overwrite filename and thumbnail of an existing image file.
///
/// Returns the record as it was before the update and as it is after.
pub fn update_image_file(conn: &Connection, file: &ImageFile) -> Result<(ImageFile, ImageFile)> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(error::storage("failed to begin transaction"))?;

    let before = get_image_file(&tx, file.id)?
        .ok_or_else(|| Error::not_found("image file", file.id))?;

    if filename_taken(&tx, &file.filename, Some(file.id))? {
        tracing::warn!(id = %file.id, filename = %file.filename, "Rejected duplicate image filename");
        return Err(duplicate_filename(&file.filename));
    }

    tx.execute(
        "UPDATE image_files SET filename = ?2, thumbnail = ?3, updated_at = ?4
         WHERE id = ?1 AND deleted_at IS NULL",
        rusqlite::params![file.id.to_string(), file.filename, file.thumbnail, now()],
    )
    .map_err(|e| {
        if error::is_unique_violation(&e) {
            duplicate_filename(&file.filename)
        } else {
            Error::storage("failed to update image file", e)
        }
    })?;

    tx.commit()
        .map_err(error::storage("failed to commit image file update"))?;

    tracing::debug!(id = %file.id, "Updated image file");
    Ok((before, file.clone()))
}

/// Soft-delete an image file by ID.
///
/// The file disappears from lookups and listings and its filename becomes
/// free again, but associations referencing it are left untouched and keep
/// reading its data. Returns `false` when no live record had that ID.
pub fn delete_image_file(conn: &Connection, id: ImageFileId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE image_files SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            rusqlite::params![id.to_string(), now()],
        )
        .map_err(error::storage("failed to delete image file"))?;
    tracing::debug!(%id, deleted = n > 0, "Deleted image file");
    Ok(n > 0)
}

/// List image files in insertion order.
pub fn list_image_files(conn: &Connection, page: Page) -> Result<Vec<ImageFile>> {
    let q = format!(
        "SELECT {COLS} FROM image_files WHERE deleted_at IS NULL
         ORDER BY rowid ASC LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn
        .prepare(&q)
        .map_err(error::storage("failed to prepare image file listing"))?;
    let rows = stmt
        .query_map([page.limit(), page.offset()], image_file_from_row)
        .map_err(error::storage("failed to list image files"))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(error::storage("failed to list image files"))?;
    Ok(rows)
}

/// List image files whose filename matches a regular expression, in
/// insertion order. An invalid pattern is reported as a storage error.
pub fn find_image_files_by_name(
    conn: &Connection,
    page: Page,
    pattern: &str,
) -> Result<Vec<ImageFile>> {
    let q = format!(
        "SELECT {COLS} FROM image_files WHERE deleted_at IS NULL AND filename REGEXP ?1
         ORDER BY rowid ASC LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn
        .prepare(&q)
        .map_err(error::storage("failed to prepare image file search"))?;
    let rows = stmt
        .query_map(
            rusqlite::params![pattern, page.limit(), page.offset()],
            image_file_from_row,
        )
        .map_err(error::storage("failed to search image files"))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(error::storage(format!(
            "failed to search image files by pattern {pattern}"
        )))?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool, PooledConnection};
    use madden_core::ErrorKind;

    fn setup() -> PooledConnection {
        let pool = init_memory_pool().unwrap();
        get_conn(&pool).unwrap()
    }

    fn seed(conn: &Connection, names: &[&str]) -> Vec<ImageFile> {
        names
            .iter()
            .map(|n| create_image_file(conn, &NewImageFile::new(*n, format!("{n}_thumb"))).unwrap())
            .collect()
    }

    #[test]
    fn create_and_get() {
        let conn = setup();
        let file = create_image_file(&conn, &NewImageFile::new("f1", "f1_thumb")).unwrap();
        let fetched = get_image_file(&conn, file.id).unwrap().unwrap();
        assert_eq!(fetched, file);
        assert!(get_image_file(&conn, ImageFileId::new()).unwrap().is_none());
    }

    #[test]
    fn duplicate_filename_conflicts() {
        let conn = setup();
        create_image_file(&conn, &NewImageFile::new("f1", "a")).unwrap();
        let err = create_image_file(&conn, &NewImageFile::new("f1", "b")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(list_image_files(&conn, Page::default()).unwrap().len(), 1);
    }

    #[test]
    fn empty_filename_is_rejected_by_storage() {
        let conn = setup();
        let err = create_image_file(&conn, &NewImageFile::new("", "t")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn update_returns_before_and_after() {
        let conn = setup();
        let file = create_image_file(&conn, &NewImageFile::new("f1", "t1")).unwrap();
        let changed = ImageFile {
            filename: "f1-renamed".into(),
            ..file.clone()
        };

        let (before, after) = update_image_file(&conn, &changed).unwrap();
        assert_eq!(before, file);
        assert_eq!(after, changed);
        assert_eq!(get_image_file(&conn, file.id).unwrap().unwrap(), changed);
    }

    #[test]
    fn update_missing_is_not_found() {
        let conn = setup();
        let ghost = ImageFile {
            id: ImageFileId::new(),
            filename: "ghost".into(),
            thumbnail: "ghost_t".into(),
        };
        let err = update_image_file(&conn, &ghost).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn update_onto_taken_filename_conflicts() {
        let conn = setup();
        let files = seed(&conn, &["a", "b"]);
        let clash = ImageFile {
            filename: "a".into(),
            ..files[1].clone()
        };
        let err = update_image_file(&conn, &clash).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // keeping its own name is not a clash
        update_image_file(&conn, &files[0]).unwrap();
    }

    #[test]
    fn delete_is_idempotent() {
        let conn = setup();
        let file = create_image_file(&conn, &NewImageFile::new("f1", "t")).unwrap();
        assert!(delete_image_file(&conn, file.id).unwrap());
        assert!(!delete_image_file(&conn, file.id).unwrap());
        assert!(get_image_file(&conn, file.id).unwrap().is_none());
    }

    #[test]
    fn deleted_files_leave_listings_and_free_their_name() {
        let conn = setup();
        let files = seed(&conn, &["f1.png", "f2.png"]);
        delete_image_file(&conn, files[0].id).unwrap();

        let live = list_image_files(&conn, Page::default()).unwrap();
        assert_eq!(live, [files[1].clone()]);
        assert!(find_image_files_by_name(&conn, Page::default(), "^f1")
            .unwrap()
            .is_empty());

        let reborn = create_image_file(&conn, &NewImageFile::new("f1.png", "new_thumb")).unwrap();
        assert_ne!(reborn.id, files[0].id);

        let ghost = ImageFile {
            filename: "f3.png".into(),
            ..files[0].clone()
        };
        let err = update_image_file(&conn, &ghost).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn list_paginated_in_insertion_order() {
        let conn = setup();
        seed(&conn, &["c", "a", "b", "e", "d"]);

        let names = |page| -> Vec<String> {
            list_image_files(&conn, page)
                .unwrap()
                .into_iter()
                .map(|f| f.filename)
                .collect()
        };
        assert_eq!(names(Page::new(0, 2)), ["c", "a"]);
        assert_eq!(names(Page::new(1, 2)), ["b", "e"]);
        assert_eq!(names(Page::new(2, 2)), ["d"]);
        assert!(names(Page::new(3, 2)).is_empty());
    }

    #[test]
    fn find_by_name_pattern() {
        let conn = setup();
        seed(&conn, &["f1.png", "banner.png", "f12.jpg", "logo_f1.gif"]);

        let hits = find_image_files_by_name(&conn, Page::new(0, 10), "^f1").unwrap();
        let names: Vec<_> = hits.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, ["f1.png", "f12.jpg"]);

        let second = find_image_files_by_name(&conn, Page::new(1, 1), "f1").unwrap();
        assert_eq!(second[0].filename, "f12.jpg");

        assert!(find_image_files_by_name(&conn, Page::default(), "^zzz")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn invalid_pattern_is_storage_error() {
        let conn = setup();
        seed(&conn, &["f1.png"]);
        let err = find_image_files_by_name(&conn, Page::default(), "(").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
