/// Lowercases and collapses runs of whitespace.
pub fn normalize_vendor_name(name: &str) -> String {
    name.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

/// Loose name match against the requester's preferred vendors: either
/// normalized name contains the other, or they are equal once spaces are
/// stripped. Can mis-match short or generic names.
pub fn is_preferred(business_name: &str, preferred: &[String]) -> bool {
    let name = normalize_vendor_name(business_name);
    if name.is_empty() {
        return false;
    }
    let compact_name = name.replace(' ', "");

    preferred.iter().any(|candidate| {
        let candidate = normalize_vendor_name(candidate);
        if candidate.is_empty() {
            return false;
        }
        name.contains(&candidate)
            || candidate.contains(&name)
            || candidate.replace(' ', "") == compact_name
    })
}
