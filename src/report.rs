//! CSV reports. A report is a serializable row type; [`ContextReportExt::add_report`] opens one
//! file per row type and [`ContextReportExt::send_report`] appends rows to it.
use crate::context::Context;
use crate::error::SimError;
use crate::hashing::HashMap;
use csv::Writer;
use std::any::TypeId;
use std::cell::RefCell;
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

/// A row type with its own report file.
pub trait Report: 'static {
    /// Key of the writer this row goes to.
    fn type_id(&self) -> TypeId;
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), csv::Error>;
}

/// Implements [`Report`] for a `Serialize` row struct.
#[macro_export]
macro_rules! create_report_trait {
    ($name:ident) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(&self, writer: &mut csv::Writer<std::fs::File>) -> Result<(), csv::Error> {
                writer.serialize(self)
            }
        }
    };
}
pub use create_report_trait;

struct ReportData {
    file_writers: RefCell<HashMap<TypeId, Writer<File>>>,
}

// Maps report type to file writer
crate::context::define_data_plugin!(
    ReportPlugin,
    ReportData,
    ReportData {
        file_writers: RefCell::new(HashMap::default()),
    }
);

/// Creates the report file and its parent directories. Only `.csv` paths are accepted.
fn create_report_file(path_name: &str) -> Result<File, SimError> {
    let path = Path::new(path_name);
    if path.extension().and_then(OsStr::to_str) != Some("csv") {
        return Err(SimError::ReportError(format!(
            "report files must be .csv: {path_name}"
        )));
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

pub trait ContextReportExt {
    /// Opens the report file for `T` at `filepath`, replacing any writer already registered for
    /// `T`.
    ///
    /// # Errors
    ///
    /// Returns a `SimError` if the path is not a `.csv` file or cannot be created.
    fn add_report<T: Report + 'static>(&mut self, filepath: &str) -> Result<(), SimError>;

    /// Whether a writer has been registered for `T`.
    fn has_report<T: Report + 'static>(&self) -> bool;

    /// Write a new row with columns following items in the report struct to the report file
    /// associated with the report type struct.
    ///
    /// # Errors
    ///
    /// Returns a `SimError` if no writer was added for the report type or the write fails.
    fn send_report<T: Report>(&self, report: T) -> Result<(), SimError>;
}

impl ContextReportExt for Context {
    fn add_report<T: Report + 'static>(&mut self, filepath: &str) -> Result<(), SimError> {
        let file = create_report_file(filepath)?;

        let data_container = self.get_data_container_mut(ReportPlugin);
        let writer = Writer::from_writer(file);
        data_container
            .file_writers
            .get_mut()
            .insert(TypeId::of::<T>(), writer);
        Ok(())
    }

    fn has_report<T: Report + 'static>(&self) -> bool {
        self.get_data_container(ReportPlugin)
            .is_some_and(|data| data.file_writers.borrow().contains_key(&TypeId::of::<T>()))
    }

    fn send_report<T: Report>(&self, report: T) -> Result<(), SimError> {
        // No data container will exist if no reports have been added
        let no_writer = || SimError::ReportError("No writer found for the report type".into());
        let data_container = self.get_data_container(ReportPlugin).ok_or_else(no_writer)?;
        let mut writers = data_container.file_writers.borrow_mut();
        let writer = writers.get_mut(&report.type_id()).ok_or_else(no_writer)?;
        report.serialize(writer)?;
        writer.flush()?;
        Ok(())
    }
}
