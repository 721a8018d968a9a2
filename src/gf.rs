//! GF(2^8) arithmetic and the systematic Reed-Solomon codec built on it.
//!
//! The field is generated by the primitive polynomial 0x11d with first
//! consecutive root `fcr = 1` and primitive element index `prim = 1`. A
//! codec instance owns its log/exp tables and generator polynomial; the
//! codeword is virtually shortened by `pad` implicit leading zero symbols
//! so that `pad + data + parity = 255`.
//!
//! `encode` and `decode` operate on caller buffers and allocate nothing.

use thiserror::Error;

/// Field size minus one; also the unshortened codeword length.
const NN: usize = 255;
/// Sentinel for the logarithm of zero.
const A0: usize = NN;
/// Primitive polynomial for GF(2^8).
const GF_POLY: usize = 0x11d;
/// First consecutive root of the generator polynomial.
const FCR: usize = 1;
/// Largest parity count the scratch buffers accommodate.
const MAX_NROOTS: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RsError {
    #[error("invalid Reed-Solomon parameters: nroots={nroots}, pad={pad}")]
    InvalidParams { nroots: usize, pad: usize },
}

#[inline]
fn modnn(x: usize) -> usize {
    x % NN
}

/// Systematic Reed-Solomon codec over GF(2^8).
pub struct ReedSolomon {
    nroots: usize,
    pad: usize,
    alpha_to: [u8; 256],
    index_of: [u8; 256],
    /// Generator polynomial in index form, `nroots + 1` coefficients.
    genpoly: [u8; MAX_NROOTS + 1],
}

impl ReedSolomon {
    /// Build log/exp tables and the generator polynomial
    /// `g(x) = prod_{i=0..nroots-1} (x - alpha^(fcr+i))`.
    pub fn new(nroots: usize, pad: usize) -> Result<Self, RsError> {
        if nroots == 0 || nroots > MAX_NROOTS || pad >= NN - nroots {
            return Err(RsError::InvalidParams { nroots, pad });
        }

        let mut alpha_to = [0u8; 256];
        let mut index_of = [0u8; 256];
        index_of[0] = A0 as u8;
        alpha_to[A0] = 0;
        let mut sr: usize = 1;
        for i in 0..NN {
            index_of[sr] = i as u8;
            alpha_to[i] = sr as u8;
            sr <<= 1;
            if sr & 0x100 != 0 {
                sr ^= GF_POLY;
            }
            sr &= 0xff;
        }

        // Generator polynomial, computed in polynomial form.
        let mut gp = [0u8; MAX_NROOTS + 1];
        gp[0] = 1;
        for i in 0..nroots {
            let root = FCR + i;
            gp[i + 1] = 1;
            for j in (1..=i).rev() {
                if gp[j] != 0 {
                    gp[j] = gp[j - 1]
                        ^ alpha_to[modnn(index_of[gp[j] as usize] as usize + root)];
                } else {
                    gp[j] = gp[j - 1];
                }
            }
            // gp[0] can never be zero
            gp[0] = alpha_to[modnn(index_of[gp[0] as usize] as usize + root)];
        }
        // Index form for quicker encoding.
        for coeff in gp.iter_mut().take(nroots + 1) {
            *coeff = index_of[*coeff as usize];
        }

        Ok(Self {
            nroots,
            pad,
            alpha_to,
            index_of,
            genpoly: gp,
        })
    }

    /// Data symbols per codeword after shortening.
    pub fn data_len(&self) -> usize {
        NN - self.pad - self.nroots
    }

    /// Systematic encode: `parity` receives the remainder of
    /// `data(x) * x^nroots mod g(x)`.
    pub fn encode(&self, data: &[u8], parity: &mut [u8]) {
        debug_assert_eq!(data.len(), self.data_len());
        debug_assert_eq!(parity.len(), self.nroots);
        parity.fill(0);
        for &sym in data {
            let feedback = self.index_of[(sym ^ parity[0]) as usize] as usize;
            if feedback != A0 {
                for j in 1..self.nroots {
                    parity[j] ^= self.alpha_to
                        [modnn(feedback + self.genpoly[self.nroots - j] as usize)];
                }
            }
            parity.copy_within(1.., 0);
            parity[self.nroots - 1] = if feedback != A0 {
                self.alpha_to[modnn(feedback + self.genpoly[0] as usize)]
            } else {
                0
            };
        }
    }

    /// Error-and-erasure decode of a shortened codeword of length
    /// `255 - pad` (data followed by parity).
    ///
    /// `erasures` holds positions into `codeword` known to be unreliable.
    /// Returns the number of located positions when correction succeeds
    /// (the corrected symbols are written back into `codeword`), `None`
    /// when `2*errors + erasures` exceeds the parity budget or the result
    /// fails the syndrome re-check. On `None` the buffer contents are
    /// unspecified.
    pub fn decode(&self, codeword: &mut [u8], erasures: &[usize]) -> Option<usize> {
        let nroots = self.nroots;
        let pad = self.pad;
        debug_assert_eq!(codeword.len(), NN - pad);
        if erasures.len() > nroots {
            return None;
        }

        let mut s = [0usize; MAX_NROOTS];
        let mut lambda = [0u8; MAX_NROOTS + 1];
        let mut b = [0usize; MAX_NROOTS + 1];
        let mut t = [0u8; MAX_NROOTS + 1];
        let mut omega = [0usize; MAX_NROOTS + 1];
        let mut reg = [0usize; MAX_NROOTS + 1];
        let mut root = [0usize; MAX_NROOTS];
        let mut loc = [0usize; MAX_NROOTS];

        if !self.syndromes(codeword, &mut s[..nroots]) {
            // Already a codeword.
            return Some(0);
        }
        // Index form.
        for syn in s.iter_mut().take(nroots) {
            *syn = self.index_of[*syn] as usize;
        }

        // Seed lambda with the erasure locator polynomial.
        lambda[0] = 1;
        let no_eras = erasures.len();
        if no_eras > 0 {
            lambda[1] = self.alpha_to[modnn(NN - 1 - erasures[0] - pad)];
            for i in 1..no_eras {
                let u = modnn(NN - 1 - erasures[i] - pad);
                for j in (1..=i + 1).rev() {
                    let tmp = self.index_of[lambda[j - 1] as usize] as usize;
                    if tmp != A0 {
                        lambda[j] ^= self.alpha_to[modnn(u + tmp)];
                    }
                }
            }
        }
        for i in 0..=nroots {
            b[i] = self.index_of[lambda[i] as usize] as usize;
        }

        // Berlekamp-Massey.
        let mut el = no_eras;
        for r in no_eras + 1..=nroots {
            let mut discr = 0usize;
            for i in 0..r {
                if lambda[i] != 0 && s[r - i - 1] != A0 {
                    discr ^= self.alpha_to
                        [modnn(self.index_of[lambda[i] as usize] as usize + s[r - i - 1])]
                        as usize;
                }
            }
            let discr = self.index_of[discr] as usize;
            if discr == A0 {
                b.copy_within(0..nroots, 1);
                b[0] = A0;
            } else {
                t[0] = lambda[0];
                for i in 0..nroots {
                    t[i + 1] = if b[i] != A0 {
                        lambda[i + 1] ^ self.alpha_to[modnn(discr + b[i])]
                    } else {
                        lambda[i + 1]
                    };
                }
                if 2 * el <= r + no_eras - 1 {
                    el = r + no_eras - el;
                    for i in 0..=nroots {
                        b[i] = if lambda[i] == 0 {
                            A0
                        } else {
                            modnn(self.index_of[lambda[i] as usize] as usize + NN - discr)
                        };
                    }
                } else {
                    b.copy_within(0..nroots, 1);
                    b[0] = A0;
                }
                lambda[..=nroots].copy_from_slice(&t[..=nroots]);
            }
        }

        // Index form of lambda and its degree.
        let mut lam = [A0; MAX_NROOTS + 1];
        let mut deg_lambda = 0usize;
        for i in 0..=nroots {
            lam[i] = self.index_of[lambda[i] as usize] as usize;
            if lam[i] != A0 {
                deg_lambda = i;
            }
        }
        if deg_lambda == 0 {
            return None;
        }

        // Chien search over the whole field.
        reg[1..=nroots].copy_from_slice(&lam[1..=nroots]);
        let mut count = 0usize;
        let mut k = 0usize;
        for i in 1..=NN {
            let mut q = 1usize;
            for j in (1..=deg_lambda).rev() {
                if reg[j] != A0 {
                    reg[j] = modnn(reg[j] + j);
                    q ^= self.alpha_to[reg[j]] as usize;
                }
            }
            if q == 0 {
                root[count] = i;
                loc[count] = k;
                count += 1;
                if count == deg_lambda {
                    break;
                }
            }
            k = modnn(k + 1);
        }
        if deg_lambda != count {
            return None;
        }

        // Evaluator omega(x) = s(x) * lambda(x) mod x^nroots, index form.
        let deg_omega = deg_lambda - 1;
        for i in 0..=deg_omega {
            let mut tmp = 0usize;
            for j in (0..=i).rev() {
                if s[i - j] != A0 && lam[j] != A0 {
                    tmp ^= self.alpha_to[modnn(s[i - j] + lam[j])] as usize;
                }
            }
            omega[i] = self.index_of[tmp] as usize;
        }

        // Forney: error magnitude at each located position. With fcr = 1
        // the X_l^(fcr-1) factor is unity.
        for j in (0..count).rev() {
            let mut num1 = 0usize;
            for i in (0..=deg_omega).rev() {
                if omega[i] != A0 {
                    num1 ^= self.alpha_to[modnn(omega[i] + i * root[j])] as usize;
                }
            }
            let mut den = 0usize;
            let mut i = (deg_lambda.min(nroots - 1) & !1) as isize;
            while i >= 0 {
                let iu = i as usize;
                if lam[iu + 1] != A0 {
                    den ^= self.alpha_to[modnn(lam[iu + 1] + iu * root[j])] as usize;
                }
                i -= 2;
            }
            if den == 0 {
                return None;
            }
            if num1 != 0 && loc[j] >= pad {
                codeword[loc[j] - pad] ^= self.alpha_to[modnn(
                    self.index_of[num1] as usize + NN - self.index_of[den] as usize,
                )];
            }
        }

        // The corrected word must be a codeword; anything else means the
        // error pattern exceeded the budget.
        let mut check = [0usize; MAX_NROOTS];
        if self.syndromes(codeword, &mut check[..nroots]) {
            return None;
        }
        Some(count)
    }

    /// Horner evaluation of the received polynomial at the generator
    /// roots. Returns true when any syndrome is nonzero.
    fn syndromes(&self, codeword: &[u8], s: &mut [usize]) -> bool {
        for syn in s.iter_mut() {
            *syn = codeword[0] as usize;
        }
        for &sym in &codeword[1..] {
            for (i, syn) in s.iter_mut().enumerate() {
                if *syn == 0 {
                    *syn = sym as usize;
                } else {
                    *syn = sym as usize
                        ^ self.alpha_to[modnn(self.index_of[*syn] as usize + FCR + i)] as usize;
                }
            }
        }
        s.iter().any(|&v| v != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: usize = 16;
    const PAD: usize = 47; // 255 - 192 - 16
    const K: usize = 192;

    fn sample_codeword(rs: &ReedSolomon) -> Vec<u8> {
        let data: Vec<u8> = (0..K).map(|i| (i * 31 + 7) as u8).collect();
        let mut parity = vec![0u8; R];
        rs.encode(&data, &mut parity);
        let mut cw = data;
        cw.extend_from_slice(&parity);
        cw
    }

    #[test]
    fn exp_table_matches_field() {
        let rs = ReedSolomon::new(R, PAD).unwrap();
        assert_eq!(rs.alpha_to[0], 1);
        assert_eq!(rs.alpha_to[1], 2);
        assert_eq!(rs.alpha_to[8], 0x1d);
        assert_eq!(rs.index_of[2], 1);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(ReedSolomon::new(0, 0).is_err());
        assert!(ReedSolomon::new(64, 0).is_err());
        assert!(ReedSolomon::new(16, 240).is_err());
    }

    #[test]
    fn clean_codeword_decodes_with_zero_corrections() {
        let rs = ReedSolomon::new(R, PAD).unwrap();
        let mut cw = sample_codeword(&rs);
        let original = cw.clone();
        assert_eq!(rs.decode(&mut cw, &[]), Some(0));
        assert_eq!(cw, original);
    }

    #[test]
    fn corrects_errors_up_to_half_parity() {
        let rs = ReedSolomon::new(R, PAD).unwrap();
        let original = sample_codeword(&rs);
        let mut cw = original.clone();
        for (n, pos) in [3usize, 40, 77, 100, 150, 191, 200, 207].iter().enumerate() {
            cw[*pos] ^= (n + 1) as u8;
        }
        let fixed = rs.decode(&mut cw, &[]).expect("within budget");
        assert_eq!(fixed, 8);
        assert_eq!(cw, original);
    }

    #[test]
    fn corrects_full_parity_budget_of_erasures() {
        let rs = ReedSolomon::new(R, PAD).unwrap();
        let original = sample_codeword(&rs);
        let mut cw = original.clone();
        let erasures: Vec<usize> = (10..26).collect();
        for &pos in &erasures {
            cw[pos] = 0xEE;
        }
        let fixed = rs.decode(&mut cw, &erasures).expect("erasures within budget");
        assert_eq!(fixed, 16);
        assert_eq!(cw, original);
    }

    #[test]
    fn corrects_mixed_errors_and_erasures() {
        let rs = ReedSolomon::new(R, PAD).unwrap();
        let original = sample_codeword(&rs);
        let mut cw = original.clone();
        // 2 errors + 12 erasures: 2*2 + 12 == 16.
        let erasures: Vec<usize> = (60..72).collect();
        for &pos in &erasures {
            cw[pos] ^= 0x55;
        }
        cw[5] ^= 1;
        cw[199] ^= 0x80;
        let fixed = rs.decode(&mut cw, &erasures).expect("mixed within budget");
        assert_eq!(fixed, 14);
        assert_eq!(cw, original);
    }

    #[test]
    fn too_many_errors_fail() {
        let rs = ReedSolomon::new(R, PAD).unwrap();
        let mut cw = sample_codeword(&rs);
        for pos in 0..9 {
            cw[pos * 20] ^= 0xA5;
        }
        assert_eq!(rs.decode(&mut cw, &[]), None);
    }

    #[test]
    fn too_many_erasures_fail() {
        let rs = ReedSolomon::new(R, PAD).unwrap();
        let mut cw = sample_codeword(&rs);
        let erasures: Vec<usize> = (0..17).collect();
        assert_eq!(rs.decode(&mut cw, &erasures), None);
    }

    #[test]
    fn erasures_on_parity_positions_recover() {
        let rs = ReedSolomon::new(R, PAD).unwrap();
        let original = sample_codeword(&rs);
        let mut cw = original.clone();
        let erasures = [192usize, 195, 207];
        for &pos in &erasures {
            cw[pos] = !cw[pos];
        }
        let fixed = rs.decode(&mut cw, &erasures).expect("parity erasures");
        assert_eq!(fixed, 3);
        assert_eq!(cw, original);
    }

    #[test]
    fn single_parity_symbol_codec() {
        let rs = ReedSolomon::new(1, 62).unwrap();
        let data: Vec<u8> = (0..rs.data_len()).map(|i| i as u8).collect();
        let mut parity = vec![0u8; 1];
        rs.encode(&data, &mut parity);
        let mut cw = data.clone();
        cw.extend_from_slice(&parity);
        assert_eq!(rs.decode(&mut cw, &[]), Some(0));
        assert_eq!(&cw[..data.len()], &data[..]);
    }
}
