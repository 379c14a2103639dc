//! Lazy outer product of two slices.

use std::iter::FusedIterator;

/// Every pair `(&left[i], &right[j])`, with `left` as the outer loop.
///
/// The length is known up front, so callers can size their result sinks
/// before the first pair is produced.
#[derive(Debug, Clone)]
pub struct OuterProduct<'a, L, R> {
    left: &'a [L],
    right: &'a [R],
    next: usize,
    end: usize,
}

/// Build the outer product of `left` and `right`.
pub fn outer_product<'a, L, R>(left: &'a [L], right: &'a [R]) -> OuterProduct<'a, L, R> {
    OuterProduct {
        left,
        right,
        next: 0,
        end: left.len() * right.len(),
    }
}

impl<'a, L, R> Iterator for OuterProduct<'a, L, R> {
    type Item = (&'a L, &'a R);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let width = self.right.len();
        let pair = (&self.left[self.next / width], &self.right[self.next % width]);
        self.next += 1;
        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl<L, R> ExactSizeIterator for OuterProduct<'_, L, R> {}

impl<L, R> FusedIterator for OuterProduct<'_, L, R> {}
