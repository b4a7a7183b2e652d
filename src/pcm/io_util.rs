use super::driver::SharedRegion;

/// Copies `src` into the data area at byte `offset`, wrapping at the end of
/// the area. Returns bytes copied, never more than the area holds.
pub(super) fn area_write(area: &SharedRegion, mut offset: usize, src: &[u8]) -> usize {
    let total = area.len();
    if total == 0 || src.is_empty() {
        return 0;
    }
    offset %= total;
    let mut length = src.len().min(total);
    let mut copied = 0;
    while length > 0 {
        let take = (total - offset).min(length);
        unsafe {
            std::ptr::copy_nonoverlapping(
                src[copied..].as_ptr(),
                area.as_mut_ptr().add(offset),
                take,
            );
        }
        copied += take;
        length -= take;
        offset = 0;
    }
    copied
}

pub(super) fn area_read(area: &SharedRegion, mut offset: usize, dst: &mut [u8]) -> usize {
    let total = area.len();
    if total == 0 || dst.is_empty() {
        return 0;
    }
    offset %= total;
    let mut length = dst.len().min(total);
    let mut copied = 0;
    while length > 0 {
        let take = (total - offset).min(length);
        unsafe {
            std::ptr::copy_nonoverlapping(
                area.as_mut_ptr().add(offset),
                dst[copied..].as_mut_ptr(),
                take,
            );
        }
        copied += take;
        length -= take;
        offset = 0;
    }
    copied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_wraps_at_end_of_area() {
        let area = SharedRegion::heap(8);
        assert_eq!(area_write(&area, 6, &[1, 2, 3, 4]), 4);
        let mut out = [0_u8; 8];
        assert_eq!(area_read(&area, 0, &mut out), 8);
        assert_eq!(out, [3, 4, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn read_is_clamped_to_area() {
        let area = SharedRegion::heap(4);
        area_write(&area, 0, &[9, 8, 7, 6]);
        let mut out = [0_u8; 10];
        assert_eq!(area_read(&area, 2, &mut out), 4);
        assert_eq!(&out[..4], &[7, 6, 9, 8]);
    }
}
