//! Content item CRUD, association lifecycle, and windowed search.

use std::collections::HashMap;

use madden_core::{
    AssociationId, ContentItem, Error, ImageAssociation, ImageLink, ItemDraft, ItemId, ItemQuery,
    Result, SortField,
};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::error;
use crate::models::{now, AssociationRow, ItemRow};

const COLS: &str = "id, begin_time, end_time, summary, details, is_historical";

const ASSOC_COLS: &str = "ii.id, ii.item_id, ii.status, f.id, f.filename, f.thumbnail";

fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::BeginTime => "begin_time",
        SortField::EndTime => "end_time",
    }
}

fn duplicate_item(draft: &ItemDraft) -> Error {
    Error::conflict(format!(
        "content item with the same window, summary and details already exists ({} - {})",
        draft.begin_time.to_rfc3339(),
        draft.end_time.to_rfc3339()
    ))
}

/// Whether another item already holds the exact (begin, end, summary, details) tuple.
fn tuple_exists(conn: &Connection, draft: &ItemDraft, except: Option<ItemId>) -> Result<bool> {
    let except = except.map(|id| id.to_string());
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM content_items
         WHERE begin_time = ?1 AND end_time = ?2 AND summary = ?3 AND details = ?4
           AND (?5 IS NULL OR id != ?5)",
        rusqlite::params![
            draft.begin_time.timestamp(),
            draft.end_time.timestamp(),
            draft.summary,
            draft.details,
            except,
        ],
        |row| row.get(0),
    )
    .map_err(error::storage("failed to check for duplicate content item"))
}

fn map_write_error<'a>(
    draft: &'a ItemDraft,
    context: &'static str,
) -> impl FnOnce(rusqlite::Error) -> Error + 'a {
    move |e| {
        if error::is_unique_violation(&e) {
            tracing::warn!(summary = %draft.summary, "Lost content item uniqueness race");
            duplicate_item(draft)
        } else {
            Error::storage(context, e)
        }
    }
}

fn insert_links(conn: &Connection, item_id: ItemId, links: &[ImageLink]) -> Result<()> {
    let ts = now();
    for link in links {
        conn.execute(
            "INSERT INTO item_images (id, item_id, image_file_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                AssociationId::new().to_string(),
                item_id.to_string(),
                link.image_file_id.to_string(),
                link.status.as_str(),
                ts,
            ],
        )
        .map_err(|e| {
            if error::is_foreign_key_violation(&e) {
                tracing::warn!(%item_id, image_file_id = %link.image_file_id, "Rejected unknown image reference");
                Error::invalid_reference(format!(
                    "image file {} does not exist",
                    link.image_file_id
                ))
            } else {
                Error::storage("failed to insert image association", e)
            }
        })?;
    }
    Ok(())
}

fn delete_links(conn: &Connection, item_id: ItemId) -> Result<usize> {
    conn.execute(
        "DELETE FROM item_images WHERE item_id = ?1",
        [item_id.to_string()],
    )
    .map_err(error::storage("failed to delete image associations"))
}

/// Load the associations of every row in one query and assemble items,
/// preserving the order of `rows`.
fn attach_images(conn: &Connection, rows: Vec<ItemRow>) -> Result<Vec<ContentItem>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; rows.len()].join(", ");
    let q = format!(
        "SELECT {ASSOC_COLS} FROM item_images ii
         JOIN image_files f ON f.id = ii.image_file_id
         WHERE ii.item_id IN ({placeholders})
         ORDER BY ii.rowid ASC"
    );
    let ids: Vec<String> = rows.iter().map(|r| r.id.to_string()).collect();

    let mut stmt = conn
        .prepare(&q)
        .map_err(error::storage("failed to prepare association query"))?;
    let associations = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), AssociationRow::from_row)
        .map_err(error::storage("failed to load image associations"))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(error::storage("failed to load image associations"))?;

    let mut by_item: HashMap<ItemId, Vec<ImageAssociation>> = HashMap::new();
    for row in associations {
        by_item.entry(row.item_id).or_default().push(row.association);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let images = by_item.remove(&row.id).unwrap_or_default();
            row.into_item(images)
        })
        .collect())
}

/// Create a content item together with its image associations.
///
/// Fails with [`Error::Conflict`] when the exact tuple already exists and
/// with [`Error::InvalidReference`] when a link names an unknown image file.
/// Either failure leaves nothing behind.
pub fn create_item(conn: &Connection, draft: &ItemDraft) -> Result<ContentItem> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(error::storage("failed to begin transaction"))?;

    if tuple_exists(&tx, draft, None)? {
        tracing::warn!(summary = %draft.summary, "Rejected duplicate content item");
        return Err(duplicate_item(draft));
    }

    let id = ItemId::new();
    let ts = now();
    tx.execute(
        "INSERT INTO content_items
             (id, begin_time, end_time, summary, details, is_historical, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        rusqlite::params![
            id.to_string(),
            draft.begin_time.timestamp(),
            draft.end_time.timestamp(),
            draft.summary,
            draft.details,
            draft.is_historical,
            ts,
        ],
    )
    .map_err(map_write_error(draft, "failed to insert content item"))?;

    insert_links(&tx, id, &draft.images)?;

    tx.commit()
        .map_err(error::storage("failed to commit content item"))?;

    tracing::debug!(%id, images = draft.images.len(), "Created content item");
    get_item(conn, id)?.ok_or_else(|| Error::not_found("content item", id))
}

/// Get a content item by ID with its associations and their image files.
pub fn get_item(conn: &Connection, id: ItemId) -> Result<Option<ContentItem>> {
    let row = conn
        .query_row(
            &format!("SELECT {COLS} FROM content_items WHERE id = ?1"),
            [id.to_string()],
            ItemRow::from_row,
        )
        .optional()
        .map_err(error::storage("failed to get content item"))?;

    match row {
        Some(row) => Ok(attach_images(conn, vec![row])?.pop()),
        None => Ok(None),
    }
}

/// Overwrite every field of an existing item and replace its associations.
///
/// Prior associations are deleted unconditionally and the draft's links are
/// inserted in their place, all in one transaction: if any link is invalid
/// the item keeps its previous state.
pub fn update_item(conn: &Connection, id: ItemId, draft: &ItemDraft) -> Result<ContentItem> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(error::storage("failed to begin transaction"))?;

    let exists: bool = tx
        .query_row(
            "SELECT COUNT(*) > 0 FROM content_items WHERE id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .map_err(error::storage("failed to look up content item"))?;
    if !exists {
        return Err(Error::not_found("content item", id));
    }

    if tuple_exists(&tx, draft, Some(id))? {
        tracing::warn!(%id, summary = %draft.summary, "Rejected update onto duplicate content item");
        return Err(duplicate_item(draft));
    }

    let removed = delete_links(&tx, id)?;

    tx.execute(
        "UPDATE content_items
         SET begin_time = ?2, end_time = ?3, summary = ?4, details = ?5,
             is_historical = ?6, updated_at = ?7
         WHERE id = ?1",
        rusqlite::params![
            id.to_string(),
            draft.begin_time.timestamp(),
            draft.end_time.timestamp(),
            draft.summary,
            draft.details,
            draft.is_historical,
            now(),
        ],
    )
    .map_err(map_write_error(draft, "failed to update content item"))?;

    insert_links(&tx, id, &draft.images)?;

    tx.commit()
        .map_err(error::storage("failed to commit content item update"))?;

    tracing::debug!(%id, removed, added = draft.images.len(), "Updated content item");
    get_item(conn, id)?.ok_or_else(|| Error::not_found("content item", id))
}

/// Delete a content item by ID. Its associations cascade.
///
/// Returns `false` when no item had that ID.
pub fn delete_item(conn: &Connection, id: ItemId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM content_items WHERE id = ?1", [id.to_string()])
        .map_err(error::storage("failed to delete content item"))?;
    tracing::debug!(%id, deleted = n > 0, "Deleted content item");
    Ok(n > 0)
}

/// Page through items active in the query window with the requested
/// historical flag.
///
/// Ordered ascending by the sort field, then by the other time field, then
/// by insertion order so that consecutive pages never overlap.
pub fn search_items(conn: &Connection, query: &ItemQuery) -> Result<Vec<ContentItem>> {
    let q = format!(
        "SELECT {COLS} FROM content_items
         WHERE begin_time < ?1 AND end_time > ?2 AND is_historical = ?3
         ORDER BY {primary} ASC, {secondary} ASC, rowid ASC
         LIMIT ?4 OFFSET ?5",
        primary = sort_column(query.sort),
        secondary = sort_column(query.sort.tie_breaker()),
    );

    let mut stmt = conn
        .prepare(&q)
        .map_err(error::storage("failed to prepare content item search"))?;
    let rows = stmt
        .query_map(
            rusqlite::params![
                query.window.end.timestamp(),
                query.window.start.timestamp(),
                query.history.is_historical(),
                query.page.limit(),
                query.page.offset(),
            ],
            ItemRow::from_row,
        )
        .map_err(error::storage("failed to search content items"))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(error::storage("failed to search content items"))?;

    tracing::debug!(
        page = query.page.number,
        size = query.page.size,
        sort = %query.sort,
        history = %query.history,
        found = rows.len(),
        "Searched content items"
    );
    attach_images(conn, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool, PooledConnection};
    use crate::queries::images;
    use chrono::{DateTime, TimeZone, Utc};
    use madden_core::{
        ErrorKind, HistoryFilter, ImageFile, ImageFileId, ImageStatus, NewImageFile, Page,
        TimeWindow,
    };

    fn setup() -> PooledConnection {
        let pool = init_memory_pool().unwrap();
        get_conn(&pool).unwrap()
    }

    fn year(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    fn draft(begin: i32, end: i32, summary: &str) -> ItemDraft {
        ItemDraft {
            begin_time: year(begin),
            end_time: year(end),
            summary: summary.to_string(),
            details: format!("{summary} details"),
            is_historical: false,
            images: Vec::new(),
        }
    }

    fn image(conn: &Connection, name: &str) -> ImageFile {
        images::create_image_file(conn, &NewImageFile::new(name, format!("{name}_thumb"))).unwrap()
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn query(page: Page, window: TimeWindow, sort: SortField) -> ItemQuery {
        ItemQuery {
            page,
            window,
            sort,
            history: HistoryFilter::NonHistoric,
        }
    }

    #[test]
    fn create_and_get_with_images() {
        let conn = setup();
        let f1 = image(&conn, "f1");
        let f2 = image(&conn, "f2");
        let mut d = draft(2020, 2021, "Runway closure at north field");
        d.images = vec![
            ImageLink::new(f1.id, ImageStatus::Fmc),
            ImageLink::new(f2.id, ImageStatus::Nmc),
        ];

        let created = create_item(&conn, &d).unwrap();
        assert_eq!(created.to_draft(), d);
        assert_eq!(created.images[0].image_file, f1);
        assert_eq!(created.images[1].image_file.thumbnail, "f2_thumb");

        let fetched = get_item(&conn, created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn get_missing_is_none() {
        let conn = setup();
        assert!(get_item(&conn, ItemId::new()).unwrap().is_none());
    }

    #[test]
    fn duplicate_tuple_conflicts_regardless_of_images() {
        let conn = setup();
        let f1 = image(&conn, "f1");
        create_item(&conn, &draft(2020, 2021, "Same announcement")).unwrap();

        let mut again = draft(2020, 2021, "Same announcement");
        again.images = vec![ImageLink::new(f1.id, ImageStatus::Pmc)];
        let err = create_item(&conn, &again).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(count(&conn, "content_items"), 1);
        assert_eq!(count(&conn, "item_images"), 0);

        // any differing field makes it a distinct item
        let mut other = draft(2020, 2021, "Same announcement");
        other.details = "different details".into();
        create_item(&conn, &other).unwrap();
    }

    #[test]
    fn unknown_image_is_invalid_reference_without_partial_insert() {
        let conn = setup();
        let f1 = image(&conn, "f1");
        let mut d = draft(2020, 2021, "Broken reference");
        d.images = vec![
            ImageLink::new(f1.id, ImageStatus::Fmc),
            ImageLink::new(ImageFileId::new(), ImageStatus::Fmc),
        ];

        let err = create_item(&conn, &d).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
        assert_eq!(count(&conn, "content_items"), 0);
        assert_eq!(count(&conn, "item_images"), 0);
    }

    #[test]
    fn update_replaces_associations_and_fields() {
        let conn = setup();
        let f1 = image(&conn, "f1");
        let f2 = image(&conn, "f2");
        let mut d = draft(2020, 2021, "Original summary text");
        d.is_historical = true;
        d.images = vec![ImageLink::new(f1.id, ImageStatus::Fmc)];
        let created = create_item(&conn, &d).unwrap();

        let mut changed = draft(2020, 2022, "Updated summary text");
        changed.images = vec![ImageLink::new(f2.id, ImageStatus::Pmc)];
        let updated = update_item(&conn, created.id, &changed).unwrap();

        assert_eq!(updated.id, created.id);
        assert!(!updated.is_historical);
        assert_eq!(updated.to_draft(), changed);
        assert_eq!(count(&conn, "item_images"), 1);
        assert_eq!(get_item(&conn, created.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn update_with_no_images_clears_associations() {
        let conn = setup();
        let f1 = image(&conn, "f1");
        let mut d = draft(2020, 2021, "Has an image");
        d.images = vec![ImageLink::new(f1.id, ImageStatus::Fmc)];
        let created = create_item(&conn, &d).unwrap();

        let updated = update_item(&conn, created.id, &draft(2020, 2021, "Has an image")).unwrap();
        assert!(updated.images.is_empty());
    }

    #[test]
    fn failed_update_keeps_previous_state() {
        let conn = setup();
        let f1 = image(&conn, "f1");
        let mut d = draft(2020, 2021, "Stable item");
        d.images = vec![ImageLink::new(f1.id, ImageStatus::Fmc)];
        let created = create_item(&conn, &d).unwrap();

        let mut bad = draft(2020, 2021, "Stable item changed");
        bad.images = vec![ImageLink::new(ImageFileId::new(), ImageStatus::Nmc)];
        let err = update_item(&conn, created.id, &bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);

        assert_eq!(get_item(&conn, created.id).unwrap().unwrap(), created);
    }

    #[test]
    fn update_missing_is_not_found() {
        let conn = setup();
        let err = update_item(&conn, ItemId::new(), &draft(2020, 2021, "Nobody home")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn update_onto_existing_tuple_conflicts() {
        let conn = setup();
        create_item(&conn, &draft(2020, 2021, "First")).unwrap();
        let second = create_item(&conn, &draft(2020, 2021, "Second")).unwrap();

        let err = update_item(&conn, second.id, &draft(2020, 2021, "First")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // rewriting an item with its own tuple is fine
        update_item(&conn, second.id, &second.to_draft()).unwrap();
    }

    #[test]
    fn delete_cascades_to_associations() {
        let conn = setup();
        let f1 = image(&conn, "f1");
        let mut d = draft(2020, 2021, "Short lived");
        d.images = vec![ImageLink::new(f1.id, ImageStatus::Fmc)];
        let created = create_item(&conn, &d).unwrap();

        assert!(delete_item(&conn, created.id).unwrap());
        assert!(get_item(&conn, created.id).unwrap().is_none());
        assert_eq!(count(&conn, "item_images"), 0);
        assert!(!delete_item(&conn, created.id).unwrap());
        // the image file is untouched
        assert!(images::get_image_file(&conn, f1.id).unwrap().is_some());
    }

    #[test]
    fn deleting_image_file_keeps_item_associations() {
        let conn = setup();
        let f1 = image(&conn, "f1");
        let f2 = image(&conn, "f2");
        let mut d = draft(2020, 2021, "Two pictures");
        d.images = vec![
            ImageLink::new(f1.id, ImageStatus::Fmc),
            ImageLink::new(f2.id, ImageStatus::Fmc),
        ];
        let created = create_item(&conn, &d).unwrap();

        assert!(images::delete_image_file(&conn, f1.id).unwrap());
        assert!(images::get_image_file(&conn, f1.id).unwrap().is_none());

        let item = get_item(&conn, created.id).unwrap().unwrap();
        assert_eq!(item, created);
        assert_eq!(item.images[0].image_file, f1);

        let found = search_items(&conn, &ItemQuery::default()).unwrap();
        assert_eq!(found[0].images.len(), 2);

        // rewriting the item with its existing links still succeeds
        let rewritten = update_item(&conn, created.id, &created.to_draft()).unwrap();
        assert_eq!(rewritten.to_draft(), d);
    }

    #[test]
    fn search_filters_by_window_and_history() {
        let conn = setup();
        create_item(&conn, &draft(2019, 2020, "Ends at window start")).unwrap();
        create_item(&conn, &draft(2019, 2021, "Spans window")).unwrap();
        create_item(&conn, &draft(2021, 2022, "Starts at window end")).unwrap();
        let mut historic = draft(2019, 2022, "Historic spanning");
        historic.is_historical = true;
        create_item(&conn, &historic).unwrap();

        let window = TimeWindow::new(year(2020), year(2021));
        let found = search_items(&conn, &query(Page::default(), window, SortField::BeginTime)).unwrap();
        let summaries: Vec<_> = found.iter().map(|i| i.summary.as_str()).collect();
        assert_eq!(summaries, ["Spans window"]);

        let mut q = query(Page::default(), window, SortField::BeginTime);
        q.history = HistoryFilter::Historic;
        let found = search_items(&conn, &q).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_historical);
    }

    #[test]
    fn search_orders_with_tie_breaker() {
        let conn = setup();
        create_item(&conn, &draft(2020, 2023, "B")).unwrap();
        create_item(&conn, &draft(2019, 2022, "C")).unwrap();
        create_item(&conn, &draft(2020, 2021, "A")).unwrap();

        let names = |sort| -> Vec<String> {
            search_items(&conn, &query(Page::default(), TimeWindow::all_time(), sort))
                .unwrap()
                .into_iter()
                .map(|i| i.summary)
                .collect()
        };
        assert_eq!(names(SortField::BeginTime), ["C", "A", "B"]);
        assert_eq!(names(SortField::EndTime), ["A", "C", "B"]);
    }

    #[test]
    fn search_pages_are_disjoint_and_contiguous() {
        let conn = setup();
        for y in 2010..2020 {
            create_item(&conn, &draft(y, 2030, &format!("Item from {y}"))).unwrap();
        }

        let all = search_items(
            &conn,
            &query(Page::new(0, 100), TimeWindow::all_time(), SortField::BeginTime),
        )
        .unwrap();
        assert_eq!(all.len(), 10);

        let mut paged = Vec::new();
        for n in 0..4 {
            let page = search_items(
                &conn,
                &query(Page::new(n, 3), TimeWindow::all_time(), SortField::BeginTime),
            )
            .unwrap();
            assert!(page.len() <= 3);
            paged.extend(page);
        }
        assert_eq!(paged, all);
    }

    #[test]
    fn search_populates_images() {
        let conn = setup();
        let f1 = image(&conn, "f1");
        let mut d = draft(2020, 2021, "With image");
        d.images = vec![ImageLink::new(f1.id, ImageStatus::Pmc)];
        create_item(&conn, &d).unwrap();
        create_item(&conn, &draft(2020, 2021, "Without image")).unwrap();

        let found = search_items(&conn, &ItemQuery::default()).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].images[0].image_file, f1);
        assert!(found[1].images.is_empty());
    }
}
