//! Custom vertex attribute channels.

/// A growable channel of extra per-vertex (or per-instance) values.
///
/// `interleave_sizes` lists the component count of each attribute packed into
/// the channel, `interleave_offsets` their byte offsets, and `interleave_stride`
/// the byte stride of one vertex worth of values.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomChannel<T> {
    pub values: Vec<T>,
    pub count: usize,
    pub interleave_sizes: Vec<u32>,
    pub interleave_offsets: Vec<u32>,
    pub interleave_stride: u32,
    /// Values advance per instance instead of per vertex.
    pub instanced: bool,
    /// Whether values are normalized when read by the shader.
    pub normalized: bool,
}

impl<T: Copy + Default> CustomChannel<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: vec![T::default(); capacity],
            count: 0,
            interleave_sizes: Vec::new(),
            interleave_offsets: Vec::new(),
            interleave_stride: 0,
            instanced: false,
            normalized: false,
        }
    }

    /// Declares the interleaved attribute layout; offsets and stride are derived.
    pub fn with_interleave(mut self, sizes: &[u32]) -> Self {
        let elem = std::mem::size_of::<T>() as u32;
        let mut offset = 0;
        self.interleave_offsets.clear();
        for &size in sizes {
            self.interleave_offsets.push(offset);
            offset += size * elem;
        }
        self.interleave_sizes = sizes.to_vec();
        self.interleave_stride = offset;
        self
    }

    /// Number of `T` values one vertex occupies.
    pub fn values_per_vertex(&self) -> usize {
        let elem = std::mem::size_of::<T>() as u32;
        if elem == 0 || self.interleave_stride == 0 {
            return 1;
        }
        (self.interleave_stride / elem) as usize
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values[..self.count]
    }

    pub fn add(&mut self, value: T) {
        if self.count >= self.values.len() {
            self.grow(self.count + 1);
        }
        self.values[self.count] = value;
        self.count += 1;
    }

    pub fn extend_from_slice(&mut self, values: &[T]) {
        if values.is_empty() {
            return;
        }
        self.grow(self.count + values.len());
        self.values[self.count..self.count + values.len()].copy_from_slice(values);
        self.count += values.len();
    }

    /// Appends `n` default values.
    pub fn extend_default(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.grow(self.count + n);
        self.values[self.count..self.count + n].fill(T::default());
        self.count += n;
    }

    /// Ensures room for `min_len` values, doubling the backing storage.
    pub fn grow(&mut self, min_len: usize) {
        if min_len <= self.values.len() {
            return;
        }
        let mut new_len = self.values.len().max(1);
        while new_len < min_len {
            new_len *= 2;
        }
        self.values.resize(new_len, T::default());
    }

    /// Same layout, no values.
    pub fn empty_clone(&self) -> Self {
        Self {
            values: Vec::new(),
            count: 0,
            interleave_sizes: self.interleave_sizes.clone(),
            interleave_offsets: self.interleave_offsets.clone(),
            interleave_stride: self.interleave_stride,
            instanced: self.instanced,
            normalized: self.normalized,
        }
    }

    /// Copies the populated prefix only, trimming spare capacity.
    pub fn clone_compact(&self) -> Self {
        let mut out = self.empty_clone();
        out.values = self.values[..self.count].to_vec();
        out.count = self.count;
        out
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn compact(&mut self) {
        self.values.truncate(self.count);
        self.values.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_derives_offsets_and_stride() {
        let ch = CustomChannel::<f32>::new(0).with_interleave(&[2, 3]);
        assert_eq!(ch.interleave_offsets, vec![0, 8]);
        assert_eq!(ch.interleave_stride, 20);
        assert_eq!(ch.values_per_vertex(), 5);
    }

    #[test]
    fn add_grows_geometrically_and_keeps_content() {
        let mut ch = CustomChannel::<i16>::new(2);
        for v in 0..5 {
            ch.add(v);
        }
        assert_eq!(ch.as_slice(), &[0, 1, 2, 3, 4]);
        assert_eq!(ch.capacity(), 8);
    }

    #[test]
    fn extend_default_overwrites_stale_backing() {
        let mut ch = CustomChannel::<u8>::new(4);
        ch.extend_from_slice(&[7, 7, 7]);
        ch.clear();
        ch.add(1);
        ch.extend_default(4);
        assert_eq!(ch.as_slice(), &[1, 0, 0, 0, 0]);
        assert!(ch.capacity() >= 5);
    }

    #[test]
    fn clone_compact_drops_spare_capacity() {
        let mut ch = CustomChannel::<f32>::new(16).with_interleave(&[2]);
        ch.instanced = true;
        ch.extend_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        let compact = ch.clone_compact();
        assert_eq!(compact.capacity(), 4);
        assert_eq!(compact.as_slice(), ch.as_slice());
        assert_eq!(compact.interleave_stride, 8);
        assert!(compact.instanced);
    }
}
