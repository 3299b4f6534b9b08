use std::sync::Arc;

use anyhow::{anyhow, Result};
use rollcall_core::Student;
use rollcall_persistence::LogStore;

use crate::Workspace;

pub struct Roster {
    store: Arc<dyn LogStore>,
}

impl Roster {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<Student>> {
        Ok(self.store.students()?)
    }

    pub fn add(&self, id: String, name: String, grade: String, section: String) -> Result<Student> {
        let id = id.trim().to_string();
        if id.is_empty() {
            return Err(anyhow!("Student ID cannot be empty"));
        }
        if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(anyhow!("Student ID must use only a-z, 0-9, - and _"));
        }
        if name.trim().is_empty() {
            return Err(anyhow!("Student name cannot be empty"));
        }

        let student = Student {
            id,
            name: name.trim().to_string(),
            grade_level: grade,
            section,
        };
        self.store.upsert_student(&student)?;
        Ok(student)
    }
}

pub fn handle_list(ws: &Workspace) -> Result<()> {
    let roster = Roster::new(ws.store()?);
    let students = roster.list()?;

    if students.is_empty() {
        println!("No students found.");
        return Ok(());
    }

    println!("{:<16} {:<28} {:<8} {:<16}", "ID", "NAME", "GRADE", "SECTION");
    println!("{:-<16} {:-<28} {:-<8} {:-<16}", "", "", "", "");
    for s in students {
        println!(
            "{:<16} {:<28} {:<8} {:<16}",
            s.id, s.name, s.grade_level, s.section
        );
    }

    Ok(())
}

pub fn handle_add(
    ws: &Workspace,
    id: String,
    name: String,
    grade: String,
    section: String,
) -> Result<()> {
    let roster = Roster::new(ws.store()?);
    let s = roster.add(id, name, grade, section)?;
    println!("Student '{}' ({}) saved.", s.name, s.id);
    Ok(())
}
