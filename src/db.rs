use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            code TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject_id TEXT,
            created_at TEXT,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_subject ON classes(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            student_no TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            enrolled_at TEXT,
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            weight REAL NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(class_id, name)
        )",
        [],
    )?;
    // Older workspaces predate per-category activation.
    ensure_categories_is_active(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_categories_class ON categories(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            category_id TEXT,
            title TEXT NOT NULL,
            max_score REAL NOT NULL,
            date TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(category_id) REFERENCES categories(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_class ON assessments(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_category ON assessments(category_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            assessment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            raw_score REAL,
            updated_at TEXT,
            PRIMARY KEY(assessment_id, student_id),
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    ensure_scores_remark(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_student ON scores(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS announcements(
            id TEXT PRIMARY KEY,
            class_id TEXT,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_announcements_class ON announcements(class_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_categories_is_active(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "categories", "is_active")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE categories ADD COLUMN is_active INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

fn ensure_scores_remark(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "scores", "remark")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE scores ADD COLUMN remark TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    #[test]
    fn open_db_adds_missing_category_column() {
        let workspace = temp_dir("gradebook-db-migrate");
        std::fs::create_dir_all(&workspace).expect("mkdir");
        {
            let conn = Connection::open(workspace.join(DB_FILE_NAME)).expect("open raw");
            conn.execute(
                "CREATE TABLE categories(
                    id TEXT PRIMARY KEY,
                    class_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    weight REAL NOT NULL,
                    sort_order INTEGER NOT NULL
                )",
                [],
            )
            .expect("create old categories");
            conn.execute(
                "INSERT INTO categories(id, class_id, name, weight, sort_order)
                 VALUES('c1', 'k1', 'Quizzes', 30, 0)",
                [],
            )
            .expect("insert old row");
        }

        let conn = open_db(&workspace).expect("open_db");
        assert!(table_has_column(&conn, "categories", "is_active").expect("pragma"));
        let active: i64 = conn
            .query_row("SELECT is_active FROM categories WHERE id = 'c1'", [], |r| {
                r.get(0)
            })
            .expect("read migrated row");
        assert_eq!(active, 1);

        drop(conn);
        let _ = std::fs::remove_dir_all(workspace);
    }

    #[test]
    fn open_db_is_idempotent() {
        let workspace = temp_dir("gradebook-db-reopen");
        drop(open_db(&workspace).expect("first open"));
        let conn = open_db(&workspace).expect("second open");
        assert!(table_has_column(&conn, "scores", "remark").expect("pragma"));
        drop(conn);
        let _ = std::fs::remove_dir_all(workspace);
    }
}
