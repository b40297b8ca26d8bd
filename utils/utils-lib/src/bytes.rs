/// Converts bytes to a kubernetes binary quantity, eg: `10Gi` for 10GiB.
/// Values are truncated to the largest unit which fits, so the quantity never
/// exceeds the given capacity.
pub fn into_quantity(bytes: u64) -> String {
    const SUFFIX: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
    const UNIT: u64 = 1024;

    if bytes < UNIT {
        return bytes.to_string();
    }
    let mut div = UNIT;
    let mut index = 0;
    let mut value = bytes / UNIT;
    while value >= UNIT {
        div *= UNIT;
        index += 1;
        value /= UNIT;
    }
    format!("{}{}", bytes / div, SUFFIX[index])
}

#[cfg(test)]
mod tests {
    use super::into_quantity;

    #[test]
    fn quantity() {
        assert_eq!(into_quantity(0), "0");
        assert_eq!(into_quantity(1023), "1023");
        assert_eq!(into_quantity(1024), "1Ki");
        assert_eq!(into_quantity(1536), "1Ki");
        assert_eq!(into_quantity(10 * 1024 * 1024 * 1024), "10Gi");
        assert_eq!(into_quantity(u64::MAX), "15Ei");
    }
}
