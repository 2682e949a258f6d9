use std::fs;
use std::path::Path;

use checks4shell_utils_string::truncate_head;

use crate::attachments::load_optional_dir;
use crate::checks::CheckRunOutput;
use crate::context::RunContext;
use crate::error::CheckRunErr;
use crate::error::Result;

/// Byte limit GitHub enforces on `output.text`.
pub const TEXT_LIMIT: usize = 65535;
/// Byte limit GitHub enforces on `output.summary`.
pub const SUMMARY_LIMIT: usize = 65535;

/// Bytes the code fence adds around the text, not counting the language tag.
const FENCE_OVERHEAD: usize = "```\n\n```".len();

/// Wraps terminal text in a fenced code block tagged with `lang`, cutting the
/// text from the front so the whole block stays within [`TEXT_LIMIT`].
pub fn fence_output(text: &str, lang: &str) -> String {
    let budget = TEXT_LIMIT.saturating_sub(FENCE_OVERHEAD + lang.len());
    let body = truncate_head(text, budget);
    format!("```{lang}\n{body}\n```")
}

/// Summary text: the contents of the named file if it exists, otherwise the
/// value itself.
pub(crate) fn read_summary(summary: &str) -> Result<String> {
    let path = Path::new(summary);
    let text = if !summary.is_empty() && path.is_file() {
        fs::read_to_string(path).map_err(|source| CheckRunErr::Summary {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        summary.to_string()
    };
    Ok(truncate_head(&text, SUMMARY_LIMIT).into_owned())
}

/// Assembles the `output` object of a report from the current terminal
/// rendering and whatever summary and attachment files exist right now.
pub(crate) fn build_output(context: &RunContext, snapshot: &str) -> Result<CheckRunOutput> {
    let title = (!context.title.is_empty()).then(|| context.title.clone());
    let text = (!snapshot.is_empty()).then(|| fence_output(snapshot, &context.syntax_highlight));
    Ok(CheckRunOutput {
        title,
        summary: read_summary(&context.summary)?,
        text,
        annotations: load_optional_dir(context.annotations_dir.as_deref())?,
        images: load_optional_dir(context.images_dir.as_deref())?,
    })
}
