//! A sequence stored inline up to `N` elements, spilling to the heap past that.
//!
//! Split results hold between one and `MAX_SPLIT` node views, so in practice
//! the heap is never touched.
use std::ops::Deref;

#[derive(Debug, Clone)]
pub enum InlineVec<T, const N: usize> {
    Inline(heapless::Vec<T, N>),
    Heap(Vec<T>),
}

impl<T, const N: usize> InlineVec<T, N> {
    pub fn new() -> Self {
        InlineVec::Inline(heapless::Vec::new())
    }

    pub fn push(&mut self, value: T) {
        match self {
            InlineVec::Inline(items) => {
                if let Err(value) = items.push(value) {
                    let mut spilled: Vec<T> = Vec::with_capacity(N * 2);
                    spilled.extend(std::mem::take(items));
                    spilled.push(value);
                    *self = InlineVec::Heap(spilled);
                }
            }
            InlineVec::Heap(items) => items.push(value),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, InlineVec::Inline(_))
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            InlineVec::Inline(items) => items.as_slice(),
            InlineVec::Heap(items) => items.as_slice(),
        }
    }
}

impl<T, const N: usize> Default for InlineVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Deref for InlineVec<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, const N: usize> Extend<T> for InlineVec<T, N> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<T, const N: usize> FromIterator<T> for InlineVec<T, N> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut v = Self::new();
        v.extend(iter);
        v
    }
}

impl<T, const N: usize> IntoIterator for InlineVec<T, N> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            InlineVec::Inline(items) => items.into_iter().collect::<Vec<T>>().into_iter(),
            InlineVec::Heap(items) => items.into_iter(),
        }
    }
}

impl<'v, T, const N: usize> IntoIterator for &'v InlineVec<T, N> {
    type Item = &'v T;
    type IntoIter = std::slice::Iter<'v, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}
