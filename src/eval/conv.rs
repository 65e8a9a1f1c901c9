use super::{Grid, Scalars};
use crate::{activation::builtin::relu, ConvLayer, Error, Filter, Result};

/// Prefix of the flattened keys emitted by a convolution layer.
pub const CONV_OUTPUT_PREFIX: &str = "conv_output";

impl ConvLayer {
    /// Convolves every image with every filter and flattens the results.
    ///
    /// Keys are `conv_output<k>` where `k` counts positions filter-major, then image-major,
    /// then row-major, then column-major.
    pub fn eval(&self, images: &[Grid]) -> Result<Scalars> {
        let mut out = Scalars::new();
        let mut k = 0usize;

        for filter in &self.filters {
            for image in images {
                for row in self.feature_map(filter, image)? {
                    for v in row {
                        out.insert(format!("{CONV_OUTPUT_PREFIX}{k}"), v);
                        k += 1;
                    }
                }
            }
        }

        Ok(out)
    }

    /// Output `(rows, columns)` for an image of the given size, or an error if the kernel
    /// doesn't fit inside the padded image. Uses floor division.
    ///
    /// A padded size or output area that doesn't fit in a `usize` is `InvalidParameters`.
    pub fn output_dims(&self, kernel: (usize, usize), image: (usize, usize)) -> Result<(usize, usize)> {
        if self.stride == 0 {
            return Err(Error::InvalidParameters("convolution stride must be positive".into()));
        }

        let padded = (self.padded(image.0)?, self.padded(image.1)?);

        if kernel.0 > padded.0 {
            return Err(Error::DimensionMismatch {
                expected: kernel.0,
                actual: padded.0,
            });
        }

        if kernel.1 > padded.1 {
            return Err(Error::DimensionMismatch {
                expected: kernel.1,
                actual: padded.1,
            });
        }

        let dims = (
            (padded.0 - kernel.0) / self.stride + 1,
            (padded.1 - kernel.1) / self.stride + 1,
        );

        match dims.0.checked_mul(dims.1) {
            Some(_) => Ok(dims),
            None => Err(Error::InvalidParameters(format!(
                "convolution output of {} x {} is too large",
                dims.0, dims.1
            ))),
        }
    }

    fn padded(&self, dim: usize) -> Result<usize> {
        self.padding
            .checked_mul(2)
            .and_then(|p| p.checked_add(dim))
            .ok_or_else(|| {
                Error::InvalidParameters(format!("padding {} overflows the image size", self.padding))
            })
    }

    /// Convolves one image with one filter, adding the filter bias and applying relu.
    ///
    /// The padded image is never built. Positions that fall in the padding read as zero.
    pub fn feature_map(&self, filter: &Filter, image: &Grid) -> Result<Grid> {
        let (kh, kw) = check_rectangular(&filter.weights)?;
        if kh == 0 || kw == 0 {
            return Err(Error::InvalidParameters("empty convolution kernel".into()));
        }

        let dims = check_rectangular(image)?;
        let (oh, ow) = self.output_dims((kh, kw), dims)?;

        let mut map = Grid::new();
        reserve(&mut map, oh)?;

        for i in 0..oh {
            let mut row = Vec::new();
            reserve(&mut row, ow)?;

            for j in 0..ow {
                let mut sum = 0.;
                for (ki, krow) in filter.weights.iter().enumerate() {
                    let Some(pixels) = self.unpadded(i, ki, dims.0).map(|r| &image[r]) else {
                        continue;
                    };

                    for (kj, w) in krow.iter().enumerate() {
                        if let Some(c) = self.unpadded(j, kj, dims.1) {
                            sum += pixels[c] * w;
                        }
                    }
                }
                row.push(relu(sum + filter.bias));
            }

            map.push(row);
        }

        Ok(map)
    }

    // maps output position `out` and kernel offset `k` back into the unpadded image,
    // or `None` when it lands in the padding.
    fn unpadded(&self, out: usize, k: usize, len: usize) -> Option<usize> {
        (out * self.stride + k)
            .checked_sub(self.padding)
            .filter(|&x| x < len)
    }
}

fn reserve<T>(v: &mut Vec<T>, n: usize) -> Result<()> {
    v.try_reserve_exact(n)
        .map_err(|e| Error::InvalidParameters(format!("cannot allocate convolution output: {e}")))
}

// returns (rows, columns) if every row has the same length.
fn check_rectangular(grid: &Grid) -> Result<(usize, usize)> {
    let width = grid.first().map_or(0, Vec::len);

    match grid.iter().find(|row| row.len() != width) {
        Some(row) => Err(Error::DimensionMismatch {
            expected: width,
            actual: row.len(),
        }),
        None => Ok((grid.len(), width)),
    }
}
