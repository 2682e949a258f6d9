mod ordering;
mod run_reports;
mod truncation;
