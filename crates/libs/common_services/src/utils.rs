/// Generate a random alphanumeric ID of a given length.
///
/// Ids never contain `_`, which separates the parts of composite ids such as like ids.
#[must_use]
pub fn nice_id(length: usize) -> String {
    const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    (0..length)
        .map(|_| {
            let idx = rand::random_range(0..ALPHANUMERIC.len());
            ALPHANUMERIC[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::nice_id;

    #[test]
    fn generates_ids_of_requested_length() {
        let id = nice_id(20);
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(nice_id(20), id);
    }
}
