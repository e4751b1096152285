/// Tab-separated header parsing shared by the miners.
///
/// Product trace logs start with a header line naming each column; data
/// lines carry the same number of tab-separated fields.
use compact_str::CompactString;

#[derive(Debug, Clone, Default)]
pub struct TabHeader {
    columns: Vec<CompactString>,
}

impl TabHeader {
    pub fn parse(header: &str) -> Self {
        Self {
            columns: header
                .split('\t')
                .map(|c| CompactString::new(c.trim()))
                .collect(),
        }
    }

    /// Index of `name`, ignoring ASCII case.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Index of the first of `names` present in the header.
    pub fn first_of(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.index_of(name))
    }
}

/// Split a data line into its fields.
pub fn split_fields(line: &str) -> Vec<&str> {
    line.split('\t').map(str::trim).collect()
}
