//! SQLite-backed ticket store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::store::{
    date_bound, GroupCount, GroupField, StoreError, StoreStats, SummaryRow, TicketQuery,
    TicketStore, TimeGroup, TimeTotal,
};
use super::types::{format_timestamp, parse_timestamp, Note, Ticket, TimeEntry, COMPLETE_STATUS};

const TICKET_COLUMNS: &str = "id, ticket_number, title, description, status, priority, \
     ticket_type, ticket_category, queue_id, create_date, due_date_time, completed_date, \
     resolved_date_time, last_activity_date, company_id, contact_id, assigned_resource_id, \
     resolution";

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id INTEGER PRIMARY KEY,
                ticket_number TEXT,
                title TEXT,
                description TEXT,
                status INTEGER,
                priority INTEGER,
                ticket_type INTEGER,
                ticket_category INTEGER,
                queue_id INTEGER,
                create_date TEXT,
                due_date_time TEXT,
                completed_date TEXT,
                resolved_date_time TEXT,
                last_activity_date TEXT,
                company_id INTEGER,
                contact_id INTEGER,
                assigned_resource_id INTEGER,
                resolution TEXT,
                synced_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_create_date ON tickets(create_date);
            CREATE INDEX IF NOT EXISTS idx_tickets_company ON tickets(company_id);
            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);

            CREATE TABLE IF NOT EXISTS ticket_notes (
                id INTEGER PRIMARY KEY,
                ticket_id INTEGER NOT NULL,
                title TEXT,
                description TEXT,
                note_type INTEGER,
                create_date_time TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_notes_ticket ON ticket_notes(ticket_id);

            CREATE TABLE IF NOT EXISTS time_entries (
                id INTEGER PRIMARY KEY,
                ticket_id INTEGER NOT NULL,
                date_worked TEXT,
                hours_worked REAL,
                summary_notes TEXT,
                resource_id INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_time_entries_ticket ON time_entries(ticket_id);
            CREATE INDEX IF NOT EXISTS idx_time_entries_resource ON time_entries(resource_id);
            "#,
        )?;

        // Migration: add summary column if it doesn't exist
        let _ = conn.execute("ALTER TABLE tickets ADD COLUMN summary TEXT", []);

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(
        query: &TicketQuery,
    ) -> Result<(String, Vec<Box<dyn rusqlite::ToSql>>), StoreError> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ticket_id) = query.ticket_id {
            conditions.push("id = ?");
            params.push(Box::new(ticket_id));
        }
        if let Some(ref ticket_number) = query.ticket_number {
            conditions.push("ticket_number = ?");
            params.push(Box::new(ticket_number.trim().to_string()));
        }
        if let Some(company_id) = query.company_id {
            conditions.push("company_id = ?");
            params.push(Box::new(company_id));
        }
        if let Some(status) = query.status {
            conditions.push("status = ?");
            params.push(Box::new(status));
        }
        match query.is_open {
            Some(true) => {
                conditions.push("(status IS NULL OR status != ?)");
                params.push(Box::new(COMPLETE_STATUS));
            }
            Some(false) => {
                conditions.push("status = ?");
                params.push(Box::new(COMPLETE_STATUS));
            }
            None => {}
        }
        if let Some(priority) = query.priority {
            conditions.push("priority = ?");
            params.push(Box::new(priority));
        }
        if let Some(queue_id) = query.queue_id {
            conditions.push("queue_id = ?");
            params.push(Box::new(queue_id));
        }
        if let Some(resource_id) = query.assigned_resource_id {
            conditions.push("assigned_resource_id = ?");
            params.push(Box::new(resource_id));
        }
        if let Some(contact_id) = query.contact_id {
            conditions.push("contact_id = ?");
            params.push(Box::new(contact_id));
        }
        if let Some(ref start) = query.start_date {
            conditions.push("create_date >= ?");
            params.push(Box::new(date_bound(start, false)?));
        }
        if let Some(ref end) = query.end_date {
            conditions.push("create_date <= ?");
            params.push(Box::new(date_bound(end, true)?));
        }
        if let Some(ref text) = query.text {
            let pattern = format!("%{}%", text.trim().to_lowercase());
            conditions.push("(LOWER(title) LIKE ? OR LOWER(description) LIKE ?)");
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
        }
        match query.has_resolution {
            Some(true) => conditions.push("(resolution IS NOT NULL AND TRIM(resolution) != '')"),
            Some(false) => conditions.push("(resolution IS NULL OR TRIM(resolution) = '')"),
            None => {}
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        Ok((where_clause, params))
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        Ok(Ticket {
            id: row.get(0)?,
            ticket_number: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            ticket_type: row.get(6)?,
            ticket_category: row.get(7)?,
            queue_id: row.get(8)?,
            create_date: timestamp_column(row, 9)?,
            due_date_time: timestamp_column(row, 10)?,
            completed_date: timestamp_column(row, 11)?,
            resolved_date_time: timestamp_column(row, 12)?,
            last_activity_date: timestamp_column(row, 13)?,
            company_id: row.get(14)?,
            contact_id: row.get(15)?,
            assigned_resource_id: row.get(16)?,
            resolution: row.get(17)?,
        })
    }

    fn select_tickets(
        &self,
        query: &TicketQuery,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<Ticket>, StoreError> {
        let conn = self.conn()?;
        let (where_clause, mut params) = Self::build_where_clause(query)?;

        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY {} LIMIT ?",
            TICKET_COLUMNS, where_clause, order_by
        );
        params.push(Box::new(limit as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_ticket)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn row_to_note(row: &rusqlite::Row) -> rusqlite::Result<Note> {
        Ok(Note {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            note_type: row.get(4)?,
            create_date_time: timestamp_column(row, 5)?,
        })
    }

    fn row_to_time_entry(row: &rusqlite::Row) -> rusqlite::Result<TimeEntry> {
        Ok(TimeEntry {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            date_worked: timestamp_column(row, 2)?,
            hours_worked: row.get(3)?,
            summary_notes: row.get(4)?,
            resource_id: row.get(5)?,
        })
    }
}

fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn timestamp_param(value: &Option<DateTime<Utc>>) -> Option<String> {
    value.as_ref().map(format_timestamp)
}

impl TicketStore for SqliteTicketStore {
    fn upsert_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO tickets (id, ticket_number, title, description, status, priority,
                ticket_type, ticket_category, queue_id, create_date, due_date_time,
                completed_date, resolved_date_time, last_activity_date, company_id,
                contact_id, assigned_resource_id, resolution, synced_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            ON CONFLICT(id) DO UPDATE SET
                ticket_number = excluded.ticket_number,
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                priority = excluded.priority,
                ticket_type = excluded.ticket_type,
                ticket_category = excluded.ticket_category,
                queue_id = excluded.queue_id,
                create_date = excluded.create_date,
                due_date_time = excluded.due_date_time,
                completed_date = excluded.completed_date,
                resolved_date_time = excluded.resolved_date_time,
                last_activity_date = excluded.last_activity_date,
                company_id = excluded.company_id,
                contact_id = excluded.contact_id,
                assigned_resource_id = excluded.assigned_resource_id,
                resolution = excluded.resolution,
                synced_at = excluded.synced_at
            "#,
            params![
                ticket.id,
                ticket.ticket_number,
                ticket.title,
                ticket.description,
                ticket.status,
                ticket.priority,
                ticket.ticket_type,
                ticket.ticket_category,
                ticket.queue_id,
                timestamp_param(&ticket.create_date),
                timestamp_param(&ticket.due_date_time),
                timestamp_param(&ticket.completed_date),
                timestamp_param(&ticket.resolved_date_time),
                timestamp_param(&ticket.last_activity_date),
                ticket.company_id,
                ticket.contact_id,
                ticket.assigned_resource_id,
                ticket.resolution,
                format_timestamp(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn upsert_notes(&self, notes: &[Note]) -> Result<usize, StoreError> {
        if notes.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO ticket_notes (id, ticket_id, title, description, note_type, create_date_time)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    ticket_id = excluded.ticket_id,
                    title = excluded.title,
                    description = excluded.description,
                    note_type = excluded.note_type,
                    create_date_time = excluded.create_date_time
                "#,
            )?;
            for note in notes {
                stmt.execute(params![
                    note.id,
                    note.ticket_id,
                    note.title,
                    note.description,
                    note.note_type,
                    timestamp_param(&note.create_date_time),
                ])?;
            }
        }
        tx.commit()?;
        Ok(notes.len())
    }

    fn upsert_time_entries(&self, entries: &[TimeEntry]) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO time_entries (id, ticket_id, date_worked, hours_worked, summary_notes, resource_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    ticket_id = excluded.ticket_id,
                    date_worked = excluded.date_worked,
                    hours_worked = excluded.hours_worked,
                    summary_notes = excluded.summary_notes,
                    resource_id = excluded.resource_id
                "#,
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.id,
                    entry.ticket_id,
                    timestamp_param(&entry.date_worked),
                    entry.hours_worked,
                    entry.summary_notes,
                    entry.resource_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    fn get_ticket(&self, id: i64) -> Result<Option<Ticket>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS);
        let ticket = conn
            .query_row(&sql, params![id], Self::row_to_ticket)
            .optional()?;
        Ok(ticket)
    }

    fn notes_for(&self, ticket_id: i64) -> Result<Vec<Note>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, title, description, note_type, create_date_time \
             FROM ticket_notes WHERE ticket_id = ? ORDER BY create_date_time ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![ticket_id], Self::row_to_note)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn time_entries_for(&self, ticket_id: i64) -> Result<Vec<TimeEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, date_worked, hours_worked, summary_notes, resource_id \
             FROM time_entries WHERE ticket_id = ? ORDER BY date_worked ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![ticket_id], Self::row_to_time_entry)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn search(&self, query: &TicketQuery, limit: usize) -> Result<Vec<Ticket>, StoreError> {
        self.select_tickets(query, "create_date DESC, id DESC", limit)
    }

    fn search_resolved(
        &self,
        query: &TicketQuery,
        limit: usize,
    ) -> Result<Vec<Ticket>, StoreError> {
        self.select_tickets(
            query,
            "resolved_date_time IS NULL, resolved_date_time DESC, id DESC",
            limit,
        )
    }

    fn find_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>, StoreError> {
        let query = TicketQuery::new().with_ticket_number(ticket_number);
        Ok(self.select_tickets(&query, "id ASC", 1)?.into_iter().next())
    }

    fn count(&self, query: &TicketQuery) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::build_where_clause(query)?;
        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn aggregate_tickets(
        &self,
        query: &TicketQuery,
        field: GroupField,
    ) -> Result<Vec<GroupCount>, StoreError> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::build_where_clause(query)?;
        let column = field.column();
        let sql = format!(
            "SELECT {col}, COUNT(*) AS n FROM tickets {filter} GROUP BY {col} ORDER BY n DESC, {col} ASC",
            col = column,
            filter = where_clause
        );

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(GroupCount {
                key: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn aggregate_time(&self, group: TimeGroup, limit: usize) -> Result<Vec<TimeTotal>, StoreError> {
        let conn = self.conn()?;
        let column = group.column();
        let sql = format!(
            "SELECT {col}, COALESCE(SUM(hours_worked), 0.0) AS total, COUNT(*) \
             FROM time_entries GROUP BY {col} ORDER BY total DESC, {col} ASC LIMIT ?",
            col = column
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(TimeTotal {
                key: row.get(0)?,
                total_hours: row.get(1)?,
                entry_count: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<i64, StoreError> {
            Ok(conn.query_row(sql, [], |row| row.get(0))?)
        };
        Ok(StoreStats {
            tickets: count("SELECT COUNT(*) FROM tickets")?,
            open_tickets: conn.query_row(
                "SELECT COUNT(*) FROM tickets WHERE status IS NULL OR status != ?",
                params![COMPLETE_STATUS],
                |row| row.get(0),
            )?,
            notes: count("SELECT COUNT(*) FROM ticket_notes")?,
            time_entries: count("SELECT COUNT(*) FROM time_entries")?,
        })
    }

    fn summary_rows(
        &self,
        limit: usize,
        with_summary_only: bool,
    ) -> Result<Vec<SummaryRow>, StoreError> {
        let conn = self.conn()?;
        let filter = if with_summary_only {
            "WHERE summary IS NOT NULL"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {cols}, summary, \
                 (SELECT COUNT(*) FROM ticket_notes n WHERE n.ticket_id = tickets.id), \
                 (SELECT COUNT(*) FROM time_entries e WHERE e.ticket_id = tickets.id), \
                 (SELECT COALESCE(SUM(hours_worked), 0.0) FROM time_entries e \
                     WHERE e.ticket_id = tickets.id) \
             FROM tickets {filter} ORDER BY create_date DESC, id DESC LIMIT ?",
            cols = TICKET_COLUMNS,
            filter = filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SummaryRow {
                ticket: Self::row_to_ticket(row)?,
                summary: row.get(18)?,
                notes_count: row.get(19)?,
                time_entries_count: row.get(20)?,
                total_hours: row.get(21)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn save_summary(&self, ticket_id: i64, summary: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE tickets SET summary = ? WHERE id = ?",
            params![summary, ticket_id],
        )?;
        Ok(updated > 0)
    }

    fn health_check(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
