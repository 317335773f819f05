//! Checksums carried by routing protocol headers.

/// Calculate internet checksum over data (RFC 1071).
/// Returns 0 when computed over data that already includes a valid checksum field.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }

    // Handle odd byte
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }

    // Fold 32-bit sum to 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

/// Internet checksum with the 16-bit field at `field` treated as zero.
pub fn internet_checksum_without(data: &[u8], field: usize) -> u16 {
    let mut copy = data.to_vec();
    for b in copy.iter_mut().skip(field).take(2) {
        *b = 0;
    }
    internet_checksum(&copy)
}

fn fletcher_sums(data: &[u8]) -> (i64, i64) {
    data.iter().fold((0i64, 0i64), |(c0, c1), &b| {
        let c0 = (c0 + i64::from(b)) % 255;
        (c0, (c1 + c0) % 255)
    })
}

/// ISO 8473 Fletcher check over data that includes its checksum.
pub fn fletcher_valid(data: &[u8]) -> bool {
    fletcher_sums(data) == (0, 0)
}

/// Fletcher checksum (ISO 8473 Annex C) for a field at `pos` inside `data`.
///
/// The field's current bytes are ignored. Returns 0 when `pos` is out of range.
pub fn fletcher_checksum(data: &[u8], pos: usize) -> u16 {
    if pos + 2 > data.len() {
        return 0;
    }
    let mut copy = data.to_vec();
    copy[pos] = 0;
    copy[pos + 1] = 0;
    let (c0, c1) = fletcher_sums(&copy);

    let len = copy.len() as i64;
    let mut x = ((len - pos as i64 - 1) * c0 - c1).rem_euclid(255);
    if x == 0 {
        x = 255;
    }
    let mut y = 510 - c0 - x;
    if y > 255 {
        y -= 255;
    }
    ((x as u16) << 8) | (y as u16 & 0xFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Router LSA (RFC 2328 A.4.2) with checksum 0x0bfb
    const ROUTER_LSA: [u8; 36] = [
        0x00, 0x01, 0x22, 0x01, 0x0a, 0x00, 0x00, 0x01, 0x0a, 0x00, 0x00, 0x01, 0x80, 0x00, 0x00,
        0x01, 0x0b, 0xfb, 0x00, 0x24, 0x00, 0x00, 0x00, 0x01, 0x0a, 0x00, 0x00, 0x02, 0xff, 0xff,
        0xff, 0x00, 0x03, 0x00, 0x00, 0x0a,
    ];

    // Test 1: internet checksum basics
    #[test]
    fn test_internet_checksum() {
        assert_eq!(internet_checksum(&[0u8; 10]), 0xFFFF);
        assert_eq!(internet_checksum(&[0xFF, 0xFF]), 0x0000);

        let mut data = vec![0x00, 0x01, 0x02, 0x03, 0x04];
        data.push(0);
        let sum = internet_checksum(&data);
        data.extend_from_slice(&sum.to_be_bytes());
        assert_eq!(internet_checksum(&data), 0);
    }

    // Test 2: zeroed-field variant
    #[test]
    fn test_internet_checksum_without() {
        let mut data = vec![0x45, 0x00, 0x00, 0x00, 0x12, 0x34];
        let sum = internet_checksum_without(&data, 2);
        data[2..4].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(internet_checksum(&data), 0);
        assert_eq!(internet_checksum_without(&data, 2), sum);
    }

    // Test 3: Fletcher verify and generate
    #[test]
    fn test_fletcher() {
        assert!(fletcher_valid(&ROUTER_LSA[2..]));
        assert_eq!(fletcher_checksum(&ROUTER_LSA[2..], 14), 0x0bfb);

        let mut bad = ROUTER_LSA;
        bad[30] ^= 0x01;
        assert!(!fletcher_valid(&bad[2..]));
        assert_eq!(fletcher_checksum(&bad[..4], 14), 0);
    }
}
